//! Store façade: public API, retention gating, the WAL-then-index write path,
//! and the background retention sweeper.

use crate::error::StoreError;
use crate::index::SeriesIndex;
use crate::persistence::WriteAheadLog;
use crate::query::execute_query;
use crate::telemetry::{noop_event_listener, store_metrics, StoreEvent, StoreEventListener};
use crate::types::{DataPoint, TagSet, Timestamp, Value};
use crate::{DEFAULT_WAL_FILE, MAX_WAL_BYTES, RETENTION_HORIZON, SWEEP_INTERVAL};

use std::path::PathBuf;
use std::sync::{mpsc, Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Commands sent to the background sweeper thread.
enum SweeperCommand {
    Sweep {
        ack: Option<mpsc::Sender<Result<usize, StoreError>>>,
    },
    Shutdown,
}

/// Configuration options for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the active WAL file. Parent directories are created on open.
    pub wal_path: PathBuf,
    /// Retention horizon; observations older than `now - retention` are
    /// neither admitted nor retained.
    pub retention: Duration,
    /// Period of the background retention sweeper.
    pub sweep_interval: Duration,
    /// Size threshold at which the active WAL file is rotated aside.
    pub max_wal_bytes: u64,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn StoreEventListener>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            wal_path: PathBuf::from(DEFAULT_WAL_FILE),
            retention: RETENTION_HORIZON,
            sweep_interval: SWEEP_INTERVAL,
            max_wal_bytes: MAX_WAL_BYTES,
            event_listener: noop_event_listener(),
        }
    }
}

/// Index and WAL behind one lock: queries share it, inserts and sweeps own it.
/// WAL line order therefore matches the logical insert order.
#[derive(Debug)]
struct StoreInner {
    index: SeriesIndex,
    wal: WriteAheadLog,
}

/// The concurrent time-series store.
///
/// Constructed open and replayed via [`TimeSeriesStore::open`]; closed via
/// [`TimeSeriesStore::close`] or `Drop`. A fresh store may be opened against
/// the same WAL path afterwards.
#[derive(Debug)]
pub struct TimeSeriesStore {
    inner: Arc<RwLock<StoreInner>>,
    /// Channel sender for sweeper thread commands.
    sweeper_tx: mpsc::Sender<SweeperCommand>,
    /// Handle for the background sweeper thread.
    sweeper_handle: Option<JoinHandle<()>>,
    /// Store configuration.
    config: StoreConfig,
}

impl TimeSeriesStore {
    /// Opens the store: opens the WAL for append (creating parent directories),
    /// stream-replays the active WAL into the index with the retention cut-off
    /// computed at this moment, and spawns the retention sweeper (first pass
    /// one full period from now).
    ///
    /// Malformed WAL lines are skipped with a diagnostic event; an I/O failure
    /// while opening or reading the WAL aborts the open and the store remains
    /// unusable.
    ///
    /// # Errors
    /// Returns an error if the WAL cannot be opened or replay hits an
    /// unrecoverable I/O error.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let events = config.event_listener.clone();

        let wal = WriteAheadLog::open(&config.wal_path, config.max_wal_bytes)?;
        let cutoff = now_millis().saturating_sub(config.retention.as_millis() as u64);

        let mut index = SeriesIndex::default();
        events.on_event(StoreEvent::ReplayStarted {
            path: config.wal_path.clone(),
        });
        let stats = wal.replay(cutoff, &*events, |point| index.insert(point))?;
        events.on_event(StoreEvent::ReplayCompleted {
            replayed: stats.replayed,
            expired: stats.expired,
            skipped: stats.skipped,
        });

        let inner = Arc::new(RwLock::new(StoreInner { index, wal }));

        let (sweeper_tx, sweeper_rx) = mpsc::channel::<SweeperCommand>();
        let inner_clone = Arc::clone(&inner);
        let events_clone = events.clone();
        let retention = config.retention;
        let period = config.sweep_interval;

        let sweeper_handle = thread::Builder::new()
            .name("gnomon-sweeper".to_string())
            .spawn(move || {
                events_clone.on_event(StoreEvent::SweeperStarted);
                loop {
                    match sweeper_rx.recv_timeout(period) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            // Background sweep errors are reported and swallowed;
                            // the next tick retries.
                            if let Err(e) = run_sweep(&inner_clone, retention, &*events_clone) {
                                events_clone.on_event(StoreEvent::SweepFailed {
                                    error: e.to_string(),
                                });
                            }
                        }
                        Ok(SweeperCommand::Sweep { ack }) => {
                            let result = run_sweep(&inner_clone, retention, &*events_clone);
                            if let Some(ack) = ack {
                                let _ = ack.send(result);
                            }
                        }
                        Ok(SweeperCommand::Shutdown)
                        | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            events_clone.on_event(StoreEvent::SweeperStopping);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| {
                StoreError::BackgroundTaskError(format!("Failed to spawn sweeper thread: {}", e))
            })?;

        Ok(TimeSeriesStore {
            inner,
            sweeper_tx,
            sweeper_handle: Some(sweeper_handle),
            config,
        })
    }

    /// Inserts one observation.
    ///
    /// This method is thread-safe and can be called concurrently from multiple
    /// threads. The observation is appended to the WAL and pushed to the OS
    /// before it becomes visible to readers, so an insert that returns `Ok`
    /// survives a crash immediately afterwards.
    ///
    /// # Errors
    /// * [`StoreError::PointTooOld`] if `timestamp` is older than the
    ///   retention horizon (no state change).
    /// * [`StoreError::Io`] if the WAL append fails (the index is not
    ///   updated).
    pub fn insert(
        &self,
        timestamp: Timestamp,
        metric: &str,
        value: Value,
        tags: TagSet,
    ) -> Result<(), StoreError> {
        let cutoff = self.retention_cutoff();
        if timestamp < cutoff {
            store_metrics::record_rejected_retention();
            return Err(StoreError::PointTooOld { timestamp, cutoff });
        }

        let point = DataPoint {
            timestamp,
            metric: metric.to_string(),
            value,
            tags,
        };

        let mut guard = self.inner.write()?;
        // Durable before visible: the WAL append completes under the write
        // hold before the index learns about the point.
        guard.wal.append(&point, &*self.config.event_listener)?;
        guard.index.insert(point);
        store_metrics::record_insert();
        Ok(())
    }

    /// Inserts one observation without logging it to the WAL.
    ///
    /// Used by replay and by bulk loaders that supply their own durability
    /// path. The retention gate still applies.
    ///
    /// # Errors
    /// Returns [`StoreError::PointTooOld`] for observations older than the
    /// retention horizon.
    pub fn insert_without_log(
        &self,
        timestamp: Timestamp,
        metric: &str,
        value: Value,
        tags: TagSet,
    ) -> Result<(), StoreError> {
        let cutoff = self.retention_cutoff();
        if timestamp < cutoff {
            return Err(StoreError::PointTooOld { timestamp, cutoff });
        }

        let point = DataPoint {
            timestamp,
            metric: metric.to_string(),
            value,
            tags,
        };

        let mut guard = self.inner.write()?;
        guard.index.insert(point);
        Ok(())
    }

    /// Queries observations for one metric within the half-open window
    /// `[time_start, time_end)`, optionally filtered by tag equality.
    ///
    /// This method is thread-safe and allows concurrent queries; it takes the
    /// read side of the store lock, so the result is a consistent snapshot
    /// with respect to concurrent writers. Results are ordered by timestamp
    /// ascending, ties broken by insertion order.
    ///
    /// An unknown metric, a window with `time_end <= time_start`, or a filter
    /// nothing matches all yield an empty list; query never fails on caller
    /// input.
    ///
    /// # Errors
    /// Returns an error only if the store lock is poisoned.
    pub fn query(
        &self,
        metric: &str,
        time_start: Timestamp,
        time_end: Timestamp,
        filters: Option<&TagSet>,
    ) -> Result<Vec<DataPoint>, StoreError> {
        let guard = self.inner.read()?;
        Ok(execute_query(
            &guard.index,
            metric,
            time_start,
            time_end,
            filters,
        ))
    }

    /// Runs a retention pass immediately and waits for its completion,
    /// returning the number of observations removed. Useful for tests and for
    /// embedders that manage their own cadence.
    ///
    /// # Errors
    /// Returns an error if the sweeper thread cannot be reached or the pass
    /// itself fails.
    pub fn sweep_now(&self) -> Result<usize, StoreError> {
        let (tx, rx) = mpsc::channel();
        self.sweeper_tx
            .send(SweeperCommand::Sweep { ack: Some(tx) })
            .map_err(|e| {
                StoreError::BackgroundTaskError(format!("Failed to send sweep command: {}", e))
            })?;
        rx.recv().map_err(|e| {
            StoreError::BackgroundTaskError(format!("Failed to receive sweep ack: {}", e))
        })?
    }

    /// Closes the store: stops the sweeper, waits for it, then flushes and
    /// closes the WAL. In-flight writes finish first (the close takes the
    /// write hold). A fresh store may be opened against the same WAL path
    /// afterwards.
    ///
    /// # Errors
    /// Returns an error if the WAL close fails; the store is considered
    /// closed regardless.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.shutdown_inner()
    }

    /// Returns a reference to the current store configuration.
    pub fn get_config(&self) -> &StoreConfig {
        &self.config
    }

    fn retention_cutoff(&self) -> Timestamp {
        now_millis().saturating_sub(self.config.retention.as_millis() as u64)
    }

    fn shutdown_inner(&mut self) -> Result<(), StoreError> {
        // Stop the sweeper first so no pass races the WAL close.
        let _ = self.sweeper_tx.send(SweeperCommand::Shutdown);
        if let Some(handle) = self.sweeper_handle.take() {
            if handle.join().is_err() {
                self.config
                    .event_listener
                    .on_event(StoreEvent::SweeperPanicked);
            }
        }

        let mut guard = self.inner.write()?;
        guard.wal.close()
    }
}

/// Best-effort shutdown when the store is dropped without an explicit close.
impl Drop for TimeSeriesStore {
    fn drop(&mut self) {
        if self.sweeper_handle.is_some() {
            if let Err(e) = self.shutdown_inner() {
                self.config.event_listener.on_event(StoreEvent::WalCloseFailed {
                    error: e.to_string(),
                });
            }
        }
    }
}

/// One retention pass: evict everything strictly older than `now - retention`
/// under the write hold, so readers observe the transition atomically.
fn run_sweep(
    inner: &Arc<RwLock<StoreInner>>,
    retention: Duration,
    events: &dyn StoreEventListener,
) -> Result<usize, StoreError> {
    let cutoff = now_millis().saturating_sub(retention.as_millis() as u64);
    let started = Instant::now();
    let removed = {
        let mut guard = inner.write()?;
        guard.index.sweep_before(cutoff)
    };
    store_metrics::record_sweep(started.elapsed(), removed as u64);
    events.on_event(StoreEvent::SweepCompleted { cutoff, removed });
    Ok(removed)
}

fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
