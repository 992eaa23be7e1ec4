//! Background aggregator.
//!
//! A worker thread owns the write side of the [`Engine`]: it drains the
//! inbound queue in arrival order, fires due debounce timers, and hands
//! changed keys to the [`PersistQueue`] on a fixed interval. Readers take a
//! shared lock and always see the state between two messages, never a
//! message half-applied.
//!
//! ```text
//!  producers ──▶ EventSink ──▶ [queue] ──▶ worker ──▶ Engine (RwLock)
//!                                            │            ▲
//!                                            ▼            │ reads
//!                                       PersistQueue   AggregatorHandle
//! ```

use crate::collector::channel::{CollectorConfig, EventQueue, EventSink};
use crate::collector::types::TabId;
use crate::core::bucketing::Histogram;
use crate::core::report::{GlobalReport, TabSnapshot};
use crate::engine::Engine;
use crate::store::{PersistQueue, StoreError};
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long the worker blocks waiting for a message before checking timers.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long shutdown waits for the last writes to land.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Engine shared between the worker and readers.
pub type SharedEngine = Arc<RwLock<Engine>>;

fn read_engine(engine: &RwLock<Engine>) -> RwLockReadGuard<'_, Engine> {
    engine.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_engine(engine: &RwLock<Engine>) -> RwLockWriteGuard<'_, Engine> {
    engine.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub queue: CollectorConfig,
    pub persist_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue: CollectorConfig::default(),
            persist_interval: Duration::from_secs(1),
        }
    }
}

impl From<&crate::config::Config> for RuntimeConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            queue: CollectorConfig {
                capacity: config.ingest_queue_capacity,
            },
            persist_interval: config.persist_interval,
        }
    }
}

/// Running aggregator: the worker thread plus read access to its engine.
pub struct AggregatorHandle {
    engine: SharedEngine,
    sink: EventSink,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    persist: Option<Arc<PersistQueue>>,
}

impl AggregatorHandle {
    /// Start the worker. `persist` receives changed keys; pass `None` to keep
    /// state in memory only.
    pub fn spawn(
        engine: Engine,
        config: RuntimeConfig,
        persist: Option<PersistQueue>,
    ) -> Result<Self, StoreError> {
        let queue = EventQueue::new(config.queue);
        let sink = queue.sink();
        let receiver = queue.into_receiver();

        let engine: SharedEngine = Arc::new(RwLock::new(engine));
        let running = Arc::new(AtomicBool::new(true));
        let persist = persist.map(Arc::new);

        let worker = {
            let engine = engine.clone();
            let running = running.clone();
            let persist = persist.clone();
            std::thread::Builder::new()
                .name("aggregator".to_string())
                .spawn(move || {
                    let mut last_persist = Instant::now();

                    while running.load(Ordering::SeqCst) {
                        match receiver.recv_timeout(POLL_INTERVAL) {
                            Ok(message) => {
                                let mut engine = write_engine(&engine);
                                // Timers run on this clock, not the producer's.
                                let now = now_ms();
                                engine.apply_at(message, now);
                                // Apply whatever else is already queued under the same lock.
                                while let Ok(message) = receiver.try_recv() {
                                    engine.apply_at(message, now);
                                }
                            }
                            Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => {
                                tracing::info!("All producers gone, stopping aggregator");
                                break;
                            }
                        }

                        write_engine(&engine).tick(now_ms());

                        if last_persist.elapsed() >= config.persist_interval {
                            flush_dirty(&engine, persist.as_deref());
                            last_persist = Instant::now();
                        }
                    }

                    // Drain anything accepted before shutdown.
                    {
                        let mut engine = write_engine(&engine);
                        let now = now_ms();
                        while let Ok(message) = receiver.try_recv() {
                            engine.apply_at(message, now);
                        }
                    }
                    flush_dirty(&engine, persist.as_deref());
                    tracing::info!("Aggregator stopped");
                })
                .map_err(|e| StoreError::IoError(e.to_string()))?
        };

        tracing::info!("Aggregator started");

        Ok(Self {
            engine,
            sink,
            running,
            worker: Some(worker),
            persist,
        })
    }

    /// Producer side of the inbound queue.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn get_snapshot(&self, tab: TabId) -> TabSnapshot {
        read_engine(&self.engine).get_snapshot(tab, now_ms())
    }

    pub fn get_global_report(&self) -> GlobalReport {
        read_engine(&self.engine).get_global_report()
    }

    pub fn get_histogram(&self, tab: TabId) -> Option<Histogram> {
        read_engine(&self.engine).get_histogram(tab, now_ms())
    }

    /// Apply everything already queued, then persist.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Aggregator thread panicked");
            }
        }
        if let Some(persist) = self.persist.take() {
            if !persist.flush(SHUTDOWN_FLUSH_TIMEOUT) {
                tracing::warn!("Timed out waiting for final writes");
            }
        }
    }
}

impl Drop for AggregatorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flush_dirty(engine: &RwLock<Engine>, persist: Option<&PersistQueue>) {
    let Some(persist) = persist else {
        return;
    };
    let writes = {
        let mut engine = write_engine(engine);
        if !engine.has_dirty() {
            return;
        }
        engine.take_dirty()
    };
    tracing::debug!("Persisting {} keys", writes.len());
    persist.enqueue_all(writes);
}
