//! Geometry worker
//!
//! A dedicated OS thread that runs decimate and repair on transferred
//! buffers. It keeps no state between calls: every request carries everything
//! needed to rebuild its geometry, and every reply hands the output buffers
//! back by ownership transfer.

use crate::buffer::{Geometry, TransferBuffer};
use crate::decimate::{decimate, DecimateParams};
use crate::error::{GeometryError, WorkerError};
use crate::repair::repair;
use crossbeam::channel::{self, Receiver, Sender};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// Worker task identifier
///
/// Independent of host command ids and never visible outside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Operation requested from the worker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskKind {
    /// Vertex-clustering simplification
    Decimate(DecimateParams),
    /// Duplicate merge plus normal recomputation
    Repair,
}

impl TaskKind {
    /// Wire name of the task type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decimate(_) => "decimate",
            Self::Repair => "repair",
        }
    }
}

/// Sandbox -> worker message
#[derive(Debug)]
pub struct WorkerRequest {
    pub id: TaskId,
    pub kind: TaskKind,
    pub position: TransferBuffer<f32>,
    pub index: Option<TransferBuffer<u32>>,
}

/// Outcome carried by a [`WorkerResponse`]
#[derive(Debug)]
pub enum TaskStatus {
    /// Processed geometry, buffers transferred back
    Success {
        position: TransferBuffer<f32>,
        index: Option<TransferBuffer<u32>>,
        normal: Option<TransferBuffer<f32>>,
    },
    /// Processing failed
    Error { message: String },
}

/// Worker -> sandbox message
#[derive(Debug)]
pub struct WorkerResponse {
    pub id: TaskId,
    pub status: TaskStatus,
}

impl WorkerResponse {
    /// Rebuild the output geometry, or the failure it reports
    pub fn into_result(self) -> Result<Geometry, WorkerError> {
        match self.status {
            TaskStatus::Success {
                position,
                index,
                normal,
            } => Ok(Geometry {
                positions: position.into_inner(),
                indices: index.map(TransferBuffer::into_inner),
                normals: normal.map(TransferBuffer::into_inner),
            }),
            TaskStatus::Error { message } => Err(WorkerError::TaskFailed(message)),
        }
    }
}

/// Run one task on owned buffers
///
/// This is the whole of the worker's compute; it is also usable inline.
pub fn process(
    kind: TaskKind,
    position: TransferBuffer<f32>,
    index: Option<TransferBuffer<u32>>,
) -> Result<Geometry, GeometryError> {
    let geometry = Geometry::new(position.into_inner(), index.map(TransferBuffer::into_inner));
    geometry.validate()?;
    Ok(match kind {
        TaskKind::Decimate(params) => decimate(geometry, params),
        TaskKind::Repair => repair(geometry),
    })
}

/// Handle to the worker thread
///
/// The thread exits on [`shutdown`](Self::shutdown), or once every request
/// sender (this handle and all clients) is gone.
#[derive(Debug)]
pub struct GeometryWorker {
    requests: Sender<WorkerRequest>,
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl GeometryWorker {
    /// Start the worker thread
    ///
    /// Replies are delivered on the returned receiver.
    pub fn spawn() -> Result<(Self, mpsc::UnboundedReceiver<WorkerResponse>), WorkerError> {
        let (req_tx, req_rx) = channel::unbounded::<WorkerRequest>();
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("geometry-worker".into())
            .spawn(move || worker_loop(&req_rx, &stop_rx, &resp_tx))
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        tracing::info!("geometry worker started");
        Ok((
            Self {
                requests: req_tx,
                stop: stop_tx,
                thread,
            },
            resp_rx,
        ))
    }

    /// Sender for posting requests
    #[inline]
    #[must_use]
    pub fn sender(&self) -> Sender<WorkerRequest> {
        self.requests.clone()
    }

    /// Stop the thread and wait for it to finish
    ///
    /// A task already running completes first; queued requests are dropped,
    /// which fails their callers with [`WorkerError::Disconnected`]. Blocks
    /// the calling thread.
    pub fn shutdown(self) {
        let Self {
            requests,
            stop,
            thread,
        } = self;
        drop(stop);
        drop(requests);
        if thread.join().is_err() {
            tracing::error!("geometry worker thread panicked");
        }
        tracing::info!("geometry worker stopped");
    }
}

fn worker_loop(
    requests: &Receiver<WorkerRequest>,
    stop: &Receiver<()>,
    responses: &mpsc::UnboundedSender<WorkerResponse>,
) {
    loop {
        let WorkerRequest {
            id,
            kind,
            position,
            index,
        } = crossbeam::select! {
            recv(requests) -> request => match request {
                Ok(request) => request,
                Err(_) => break,
            },
            // Only ever disconnects
            recv(stop) -> _ => break,
        };
        tracing::debug!(%id, task = kind.as_str(), vertices = position.len() / 3, "worker task received");
        let status = match process(kind, position, index) {
            Ok(out) => TaskStatus::Success {
                position: TransferBuffer::new(out.positions),
                index: out.indices.map(TransferBuffer::new),
                normal: out.normals.map(TransferBuffer::new),
            },
            Err(err) => TaskStatus::Error {
                message: err.to_string(),
            },
        };
        if responses.send(WorkerResponse { id, status }).is_err() {
            // Nobody is listening any more
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_rejects_bad_indices() {
        let result = process(
            TaskKind::Repair,
            TransferBuffer::new(vec![0.0; 9]),
            Some(TransferBuffer::new(vec![0, 1, 9])),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn worker_replies_with_same_id() {
        let (worker, mut responses) = GeometryWorker::spawn().unwrap();
        worker
            .sender()
            .send(WorkerRequest {
                id: TaskId(7),
                kind: TaskKind::Repair,
                position: TransferBuffer::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
                index: None,
            })
            .unwrap();

        let reply = responses.recv().await.unwrap();
        assert_eq!(reply.id, TaskId(7));
        let geometry = reply.into_result().unwrap();
        assert_eq!(geometry.vertex_count(), 3);
        worker.shutdown();
    }

    #[tokio::test]
    async fn worker_reports_processing_errors() {
        let (worker, mut responses) = GeometryWorker::spawn().unwrap();
        worker
            .sender()
            .send(WorkerRequest {
                id: TaskId(1),
                kind: TaskKind::Decimate(DecimateParams::new(0.5)),
                position: TransferBuffer::new(vec![0.0; 4]),
                index: None,
            })
            .unwrap();

        let reply = responses.recv().await.unwrap();
        assert!(matches!(reply.into_result(), Err(WorkerError::TaskFailed(_))));
        worker.shutdown();
    }
}
