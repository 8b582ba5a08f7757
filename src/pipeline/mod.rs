//! Ordered write pipeline.
//!
//! All writes to every level go through one worker task, in submission
//! order. Producers get a [`WriteHandle`] per write and decide when to wait:
//!
//! ```text
//!  ingest ──submit──► [ bounded queue ] ──► worker ──► TileStore
//!     ▲                                        │
//!     └────────────── WriteHandle ◄────────────┘
//! ```
//!
//! The queue is bounded, so a producer that outruns the disk blocks in
//! `submit` rather than buffering unbounded pixel data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{PyramidError, StoreError};
use crate::metadata::{TileKey, TileTags};
use crate::raster::Rect;
use crate::store::TileStore;

/// Default number of writes that may be queued before `submit` waits.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 64;

// =============================================================================
// Write Tasks
// =============================================================================

/// One unit of work for the pipeline.
#[derive(Debug, Clone)]
pub enum WriteTask {
    /// Store a complete tile
    CreateTile {
        key: TileKey,
        tags: TileTags,
        pixels: Bytes,
    },

    /// Replace a rectangle of an existing tile
    OverwriteRegion {
        key: TileKey,
        rect: Rect,
        pixels: Bytes,
    },
}

impl WriteTask {
    pub fn key(&self) -> &TileKey {
        match self {
            WriteTask::CreateTile { key, .. } | WriteTask::OverwriteRegion { key, .. } => key,
        }
    }

    async fn apply<S: TileStore + ?Sized>(self, store: &S) -> Result<(), StoreError> {
        match self {
            WriteTask::CreateTile { key, tags, pixels } => store.put_tile(key, tags, pixels).await,
            WriteTask::OverwriteRegion { key, rect, pixels } => {
                store.overwrite_tile_region(&key, rect, pixels).await
            }
        }
    }
}

struct WriteJob<S> {
    store: Arc<S>,
    task: WriteTask,
    done: oneshot::Sender<Result<(), StoreError>>,
}

enum Message<S> {
    Write(WriteJob<S>),
    Barrier(oneshot::Sender<()>),
}

/// Completion handle for one submitted write.
#[derive(Debug)]
pub struct WriteHandle {
    key: TileKey,
    rx: oneshot::Receiver<Result<(), StoreError>>,
}

impl WriteHandle {
    pub fn key(&self) -> &TileKey {
        &self.key
    }

    /// Wait for the write to be applied.
    pub async fn wait(self) -> Result<(), StoreError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(StoreError::Closed("write pipeline".to_string())))
    }
}

/// Wait for every handle. All writes are awaited even after a failure; the
/// first failure is returned.
pub async fn await_all(handles: Vec<WriteHandle>) -> Result<(), PyramidError> {
    let mut first_error = None;
    for handle in handles {
        let key = handle.key;
        if let Err(e) = handle.wait().await {
            error!(key = %key, error = %e, "Queued write failed");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(PyramidError::StorageWriteFailure(e)),
        None => Ok(()),
    }
}

// =============================================================================
// Write Pipeline
// =============================================================================

/// Single-worker write queue for the stores of one pyramid.
pub struct WritePipeline<S: TileStore + 'static> {
    tx: Mutex<Option<mpsc::Sender<Message<S>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    applied: Arc<AtomicU64>,
}

impl<S: TileStore + 'static> WritePipeline<S> {
    /// Start the worker task. Must be called inside a tokio runtime.
    pub fn new(queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let applied = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(run_worker(rx, Arc::clone(&applied)));

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            applied,
        }
    }

    /// Queue a write. Waits while the queue is full.
    pub async fn submit(&self, store: Arc<S>, task: WriteTask) -> Result<WriteHandle, PyramidError> {
        let key = *task.key();
        let (done, rx) = oneshot::channel();
        self.send(Message::Write(WriteJob { store, task, done }))
            .await?;
        Ok(WriteHandle { key, rx })
    }

    /// Wait until every write submitted before this call has been applied.
    pub async fn drain(&self) -> Result<(), PyramidError> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Barrier(tx)).await?;
        rx.await.map_err(|_| PyramidError::Closed)
    }

    /// Stop accepting writes, let the worker finish the queue, and join it.
    pub async fn shutdown(&self) {
        self.tx.lock().await.take();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "Write pipeline worker panicked");
            }
        }
    }

    /// Number of writes applied so far, failed ones included.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }

    async fn send(&self, message: Message<S>) -> Result<(), PyramidError> {
        let tx = self.tx.lock().await.clone().ok_or(PyramidError::Closed)?;
        tx.send(message).await.map_err(|_| PyramidError::Closed)
    }
}

async fn run_worker<S: TileStore + 'static>(
    mut rx: mpsc::Receiver<Message<S>>,
    applied: Arc<AtomicU64>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Write(job) => {
                let key = *job.task.key();
                let result = job.task.apply(job.store.as_ref()).await;
                if let Err(e) = &result {
                    error!(store = job.store.describe(), key = %key, error = %e, "Write failed");
                }
                applied.fetch_add(1, Ordering::AcqRel);
                // The producer may have stopped waiting
                let _ = job.done.send(result);
            }
            Message::Barrier(reply) => {
                let _ = reply.send(());
            }
        }
    }
    debug!("Write pipeline stopped");
}

// =============================================================================
// Tests
// =============================================================================
