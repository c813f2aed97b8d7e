#![doc = r#"
gnomon: Embeddable Time-Series Store with a Write-Ahead Log

This crate provides a small, concurrent, in-process store for tagged numeric
observations. A writer appends observations of the form (timestamp, metric,
value, tag set); readers issue range queries scoped to one metric, a half-open
time window, and an optional tag-equality filter. The store is durable across
process restarts through a line-oriented write-ahead log and enforces a fixed
24-hour retention horizon on both memory and persisted state. It supports:
- Crash-durable inserts (WAL append before index visibility)
- Ordered-by-timestamp indexing with efficient range scans
- Tag-based filtering and half-open time range queries
- Streaming WAL replay at startup with a retention cut-off
- Background retention sweeping
- Thread-safe architecture

See the README for usage examples and more details.
"#]
// Declare modules
pub mod core;
pub mod error;
pub mod index;
pub mod persistence;
pub mod query;
pub mod telemetry;
pub mod types;

/// Main entry point for interacting with the time-series store.
pub use crate::core::TimeSeriesStore;
/// Configuration options for the store.
pub use crate::core::StoreConfig;
/// Error type for store operations.
pub use crate::error::StoreError;
/// Write-Ahead Log for durability and recovery.
pub use crate::persistence::WriteAheadLog;
/// Structured event hook for observability.
pub use crate::telemetry::{StoreEvent, StoreEventListener};
/// Represents a single tagged observation.
pub use crate::types::DataPoint;
/// Type alias for a set of tags (key-value pairs) associated with an observation.
pub use crate::types::TagSet;
/// Type alias for a timestamp (milliseconds since epoch).
pub use crate::types::Timestamp;
/// Type alias for an observation value (f64).
pub use crate::types::Value;

use std::time::Duration;

/// Retention horizon: observations older than `now - horizon` are neither
/// admitted nor retained (24 hours).
pub const RETENTION_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

/// Period of the background retention sweeper (60 seconds).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Size threshold at which the active WAL file is rotated aside (50 MiB).
pub const MAX_WAL_BYTES: u64 = 50 * 1024 * 1024;

/// File name of the active WAL, relative to the working directory by default.
pub const DEFAULT_WAL_FILE: &str = "timeseries.log";
