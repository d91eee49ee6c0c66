//! Worker task protocol
//!
//! Correlates each request posted to the [`GeometryWorker`] with its reply:
//! - `run_task` copies the live buffers, assigns a [`TaskId`], records a
//!   responder and posts the request with the copies transferred
//! - a response pump resolves each responder exactly once by id
//!
//! The protocol does not serialize tasks against the same mesh. Two
//! concurrent decimates of one object race, and keeping them apart is the
//! caller's job.

use crate::buffer::{Geometry, TransferBuffer};
use crate::error::WorkerError;
use crate::worker::{GeometryWorker, TaskId, TaskKind, WorkerRequest, WorkerResponse};
use crossbeam::channel::Sender;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Responder = oneshot::Sender<Result<Geometry, WorkerError>>;

#[derive(Debug)]
struct ClientInner {
    requests: Sender<WorkerRequest>,
    pending: DashMap<TaskId, Responder>,
    next_id: AtomicU64,
}

/// Cloneable handle for running tasks on the geometry worker
#[derive(Debug, Clone)]
pub struct WorkerClient {
    inner: Arc<ClientInner>,
}

impl WorkerClient {
    /// Attach to a running worker and start the response pump
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(
        worker: &GeometryWorker,
        responses: mpsc::UnboundedReceiver<WorkerResponse>,
    ) -> Self {
        let inner = Arc::new(ClientInner {
            requests: worker.sender(),
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
        });
        tokio::spawn(response_pump(Arc::clone(&inner), responses));
        Self { inner }
    }

    /// Run `kind` against a copy of `geometry`
    ///
    /// The live arrays stay with the caller; only the copies move to the
    /// worker. The returned future resolves once, with the processed geometry
    /// or the task's failure. Dropping it only stops waiting; the worker still
    /// finishes the computation.
    pub fn run_task(
        &self,
        kind: TaskKind,
        geometry: &Geometry,
    ) -> impl Future<Output = Result<Geometry, WorkerError>> + Send + 'static {
        let posted = self.post(kind, geometry);
        async move {
            let rx = posted?;
            rx.await.map_err(|_| WorkerError::Disconnected)?
        }
    }

    /// Number of tasks awaiting a reply
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    fn post(
        &self,
        kind: TaskKind,
        geometry: &Geometry,
    ) -> Result<oneshot::Receiver<Result<Geometry, WorkerError>>, WorkerError> {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);

        let request = WorkerRequest {
            id,
            kind,
            position: TransferBuffer::copy_from(&geometry.positions),
            index: geometry.indices.as_deref().map(TransferBuffer::copy_from),
        };
        tracing::debug!(%id, task = kind.as_str(), vertices = geometry.vertex_count(), "posting worker task");

        if self.inner.requests.send(request).is_err() {
            self.inner.pending.remove(&id);
            return Err(WorkerError::Disconnected);
        }
        Ok(rx)
    }
}

async fn response_pump(
    inner: Arc<ClientInner>,
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
) {
    while let Some(response) = responses.recv().await {
        let id = response.id;
        match inner.pending.remove(&id) {
            Some((_, responder)) => {
                // Receiver may have stopped waiting; nothing to do then.
                let _ = responder.send(response.into_result());
            }
            None => tracing::warn!(%id, "reply for unknown worker task dropped"),
        }
    }

    // Worker is gone: fail whatever is still waiting.
    let stranded: Vec<TaskId> = inner.pending.iter().map(|e| *e.key()).collect();
    for id in stranded {
        if let Some((_, responder)) = inner.pending.remove(&id) {
            let _ = responder.send(Err(WorkerError::Disconnected));
        }
    }
    tracing::debug!("worker response pump finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimate::DecimateParams;
    use crate::primitives;

    #[tokio::test]
    async fn repair_round_trip_is_lossless() {
        let (worker, responses) = GeometryWorker::spawn().unwrap();
        let client = WorkerClient::connect(&worker, responses);

        let input = primitives::plane();
        let out = client.run_task(TaskKind::Repair, &input).await.unwrap();

        assert_eq!(out.positions, input.positions);
        assert_eq!(out.indices, input.indices);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_tasks_resolve_by_id() {
        let (worker, responses) = GeometryWorker::spawn().unwrap();
        let client = WorkerClient::connect(&worker, responses);

        let sphere = primitives::sphere(64);
        let a = client.run_task(TaskKind::Decimate(DecimateParams::new(0.5)), &sphere);
        let b = client.run_task(TaskKind::Decimate(DecimateParams::new(0.2)), &sphere);
        let (a, b) = tokio::join!(a, b);

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.vertex_count() <= 1072);
        assert!(b.vertex_count() <= 429);
        // Live geometry untouched by the transfer
        assert_eq!(sphere.vertex_count(), 65 * 33);
    }

    #[tokio::test]
    async fn failed_task_rejects() {
        let (worker, responses) = GeometryWorker::spawn().unwrap();
        let client = WorkerClient::connect(&worker, responses);

        let broken = Geometry::new(vec![0.0; 9], Some(vec![0, 1, 3]));
        let err = client.run_task(TaskKind::Repair, &broken).await.unwrap_err();
        assert!(matches!(err, WorkerError::TaskFailed(_)));
    }

    #[tokio::test]
    async fn shutdown_with_live_client_fails_later_tasks() {
        let (worker, responses) = GeometryWorker::spawn().unwrap();
        let client = WorkerClient::connect(&worker, responses);
        worker.shutdown();

        let err = client
            .run_task(TaskKind::Repair, &primitives::plane())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Disconnected));
        assert_eq!(client.pending_count(), 0);
    }
}
