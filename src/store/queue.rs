//! Serialized write queue in front of a [`StateStore`].
//!
//! A single writer thread applies writes in the order they were enqueued, so
//! two updates to the same key can never interleave. Failed writes are logged
//! and dropped; ingestion never waits on the store.

use super::{StateStore, StoreError, StoreKey};
use crossbeam_channel::{bounded, unbounded, Sender};
use serde_json::Value;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

enum WriteOp {
    Write(StoreKey, Value),
    Barrier(Sender<()>),
}

/// Handle to the writer thread.
pub struct PersistQueue {
    sender: Option<Sender<WriteOp>>,
    worker: Option<JoinHandle<()>>,
}

impl PersistQueue {
    /// Start the writer thread for `store`.
    pub fn spawn(store: Arc<dyn StateStore>) -> Result<Self, StoreError> {
        let (sender, receiver) = unbounded::<WriteOp>();

        let worker = std::thread::Builder::new()
            .name("persist-queue".to_string())
            .spawn(move || {
                for op in receiver {
                    match op {
                        WriteOp::Write(key, value) => {
                            if let Err(e) = store.write(key, &value) {
                                tracing::warn!("Dropping write to {}: {}", key, e);
                            }
                        }
                        WriteOp::Barrier(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                tracing::debug!("Persist queue drained");
            })
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queue a write of `value` to `key`.
    pub fn enqueue(&self, key: StoreKey, value: Value) -> Result<(), StoreError> {
        self.sender
            .as_ref()
            .ok_or(StoreError::Closed)?
            .send(WriteOp::Write(key, value))
            .map_err(|_| StoreError::Closed)
    }

    /// Queue every write in `writes`, logging instead of failing.
    pub fn enqueue_all(&self, writes: impl IntoIterator<Item = (StoreKey, Value)>) {
        for (key, value) in writes {
            if let Err(e) = self.enqueue(key, value) {
                tracing::warn!("Dropping write to {}: {}", key, e);
            }
        }
    }

    /// Wait until every write queued so far has been applied.
    ///
    /// Returns `false` if the writer did not catch up within `timeout`.
    pub fn flush(&self, timeout: Duration) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            return true;
        };
        let (done_tx, done_rx) = bounded(1);
        if sender.send(WriteOp::Barrier(done_tx)).is_err() {
            return false;
        }
        done_rx.recv_timeout(timeout).is_ok()
    }

    /// Apply all pending writes and stop the writer thread.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        // Dropping the sender ends the writer loop once the queue is empty.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Persist queue thread panicked");
            }
        }
    }
}

impl Drop for PersistQueue {
    fn drop(&mut self) {
        self.close();
    }
}
