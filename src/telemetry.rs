use std::path::PathBuf;
use std::sync::Arc;

use crate::types::Timestamp;

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not
/// acceptable for production. Instead, callers can provide an implementation
/// that forwards these events to `tracing`, `log`, metrics, or custom sinks.
pub trait StoreEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: StoreEvent);
}

/// Structured events emitted by the store.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    SweeperStarted,
    SweeperStopping,
    SweeperPanicked,

    SweepCompleted { cutoff: Timestamp, removed: usize },
    SweepFailed { error: String },

    ReplayStarted { path: PathBuf },
    ReplayCompleted { replayed: usize, expired: usize, skipped: usize },
    ReplayLineSkipped { line_number: usize, reason: String },

    WalRotated { path: PathBuf },
    WalRotateFailed { error: String },
    WalCloseFailed { error: String },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl StoreEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: StoreEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn StoreEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics instrumentation through the `metrics` facade.
///
/// ## Key properties
/// - Library-safe: recording is effectively a no-op until the embedding
///   application installs a recorder.
/// - No exporter and no network surface; the store only emits.
pub mod store_metrics {
    use ::metrics::{describe_counter, describe_histogram, Unit};
    use std::time::Duration;

    // --- metric names ---
    //
    // Counters are exposed as `<name>_total` by typical exporters.

    pub const INSERT_POINTS: &str = "gnomon_insert_points";
    pub const INSERT_REJECTED_RETENTION: &str = "gnomon_insert_rejected_retention";

    pub const WAL_BYTES_WRITTEN: &str = "gnomon_wal_bytes_written";
    pub const WAL_FSYNC_DURATION_SECONDS: &str = "gnomon_wal_fsync_duration_seconds";

    pub const REPLAY_POINTS: &str = "gnomon_replay_points";
    pub const REPLAY_SKIPPED_LINES: &str = "gnomon_replay_skipped_lines";

    pub const SWEEP_REMOVED_POINTS: &str = "gnomon_sweep_removed_points";
    pub const SWEEP_DURATION_SECONDS: &str = "gnomon_sweep_duration_seconds";

    #[inline]
    pub fn record_insert() {
        ::metrics::counter!(INSERT_POINTS).increment(1);
    }

    #[inline]
    pub fn record_rejected_retention() {
        ::metrics::counter!(INSERT_REJECTED_RETENTION).increment(1);
    }

    #[inline]
    pub fn record_wal_bytes_written(bytes: u64) {
        if bytes > 0 {
            ::metrics::counter!(WAL_BYTES_WRITTEN).increment(bytes);
        }
    }

    #[inline]
    pub fn record_wal_fsync(duration: Duration) {
        ::metrics::histogram!(WAL_FSYNC_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    #[inline]
    pub fn record_replay(points: u64, skipped: u64) {
        if points > 0 {
            ::metrics::counter!(REPLAY_POINTS).increment(points);
        }
        if skipped > 0 {
            ::metrics::counter!(REPLAY_SKIPPED_LINES).increment(skipped);
        }
    }

    #[inline]
    pub fn record_sweep(duration: Duration, removed: u64) {
        ::metrics::histogram!(SWEEP_DURATION_SECONDS).record(duration.as_secs_f64());
        if removed > 0 {
            ::metrics::counter!(SWEEP_REMOVED_POINTS).increment(removed);
        }
    }

    /// Registers descriptions for every metric this crate emits. Call once
    /// after installing a recorder.
    pub fn describe_all() {
        describe_counter!(
            INSERT_POINTS,
            Unit::Count,
            "Total number of observations accepted via TimeSeriesStore::insert."
        );
        describe_counter!(
            INSERT_REJECTED_RETENTION,
            Unit::Count,
            "Total number of inserts rejected for being older than the retention horizon."
        );
        describe_counter!(
            WAL_BYTES_WRITTEN,
            Unit::Bytes,
            "Total number of bytes appended to the WAL (logical bytes, not including filesystem metadata)."
        );
        describe_counter!(
            REPLAY_POINTS,
            Unit::Count,
            "Total number of observations rebuilt from the WAL at startup."
        );
        describe_counter!(
            REPLAY_SKIPPED_LINES,
            Unit::Count,
            "Total number of malformed WAL lines skipped during replay."
        );
        describe_counter!(
            SWEEP_REMOVED_POINTS,
            Unit::Count,
            "Total number of observations evicted by the retention sweeper."
        );

        describe_histogram!(
            WAL_FSYNC_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of WAL flush/sync_data calls."
        );
        describe_histogram!(
            SWEEP_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of one retention sweeper pass."
        );
    }
}
