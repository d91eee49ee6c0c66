//! Host-side scene-graph mirror
//!
//! Replaced wholesale by every `sceneGraphUpdate`; never patched.

use crate::error::SessionError;
use scenelink_protocol::{ObjectId, SceneNode};
use tokio::sync::watch;

/// Latest scene-graph snapshot received from the sandbox
#[derive(Debug, Clone)]
pub struct SceneMirror {
    rx: watch::Receiver<Vec<SceneNode>>,
}

/// Writing half, owned by the session pump
#[derive(Debug)]
pub(crate) struct MirrorWriter {
    tx: watch::Sender<Vec<SceneNode>>,
}

pub(crate) fn mirror() -> (MirrorWriter, SceneMirror) {
    let (tx, rx) = watch::channel(Vec::new());
    (MirrorWriter { tx }, SceneMirror { rx })
}

impl MirrorWriter {
    pub(crate) fn replace(&self, nodes: Vec<SceneNode>) {
        tracing::trace!(nodes = nodes.len(), "scene mirror replaced");
        self.tx.send_replace(nodes);
    }
}

impl SceneMirror {
    /// Copy of the current snapshot
    #[must_use]
    pub fn nodes(&self) -> Vec<SceneNode> {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<SceneNode> {
        self.rx.borrow().iter().find(|n| n.id == id).cloned()
    }

    /// First node with this name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<SceneNode> {
        self.rx.borrow().iter().find(|n| n.name == name).cloned()
    }

    #[must_use]
    pub fn selected(&self) -> Option<SceneNode> {
        self.rx.borrow().iter().find(|n| n.selected).cloned()
    }

    /// Wait for the next snapshot
    pub async fn updated(&mut self) -> Result<Vec<SceneNode>, SessionError> {
        self.rx.changed().await.map_err(|_| SessionError::Closed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Wait until the snapshot satisfies `predicate`
    ///
    /// Checks the current snapshot first.
    pub async fn wait_until(
        &mut self,
        mut predicate: impl FnMut(&[SceneNode]) -> bool,
    ) -> Result<Vec<SceneNode>, SessionError> {
        let nodes = self
            .rx
            .wait_for(|nodes| predicate(nodes))
            .await
            .map_err(|_| SessionError::Closed)?
            .clone();
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenelink_protocol::SceneNodeKind;

    fn node(name: &str, selected: bool) -> SceneNode {
        SceneNode {
            id: ObjectId::new(),
            name: name.into(),
            kind: SceneNodeKind::Mesh,
            visible: true,
            selected,
        }
    }

    #[tokio::test]
    async fn snapshots_replace_wholesale() {
        let (writer, mut mirror) = mirror();
        assert!(mirror.is_empty());

        writer.replace(vec![node("A", false), node("B", true)]);
        let nodes = mirror.updated().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(mirror.selected().unwrap().name, "B");

        writer.replace(vec![node("C", false)]);
        mirror.updated().await.unwrap();
        assert!(mirror.find("A").is_none());
        assert!(mirror.selected().is_none());
        assert_eq!(mirror.len(), 1);
    }

    #[tokio::test]
    async fn closed_writer_ends_waits() {
        let (writer, mut mirror) = mirror();
        drop(writer);
        assert!(matches!(mirror.updated().await, Err(SessionError::Closed)));
    }
}
