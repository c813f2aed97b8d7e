//! In-memory index: metric -> ordered-by-timestamp map -> bucket of observations
//! sharing that metric and timestamp.

use crate::types::{DataPoint, Timestamp};
use std::collections::{BTreeMap, HashMap};

/// Per-metric map, ordered by timestamp ascending. Each entry is the bucket of
/// observations sharing that timestamp, in insertion order.
pub type MetricMap = BTreeMap<Timestamp, Vec<DataPoint>>;

/// Two-level index over all metrics.
///
/// The outer map keys by metric name; the ordered inner map gives logarithmic
/// seek into a time window and linear iteration over its contents. The index
/// carries no synchronization of its own; the owning store wraps it in a
/// reader-writer lock.
#[derive(Debug, Default)]
pub struct SeriesIndex {
    metrics: HashMap<String, MetricMap>,
}

impl SeriesIndex {
    /// Inserts a single observation under its own metric and timestamp,
    /// creating the metric map and bucket as needed.
    pub fn insert(&mut self, point: DataPoint) {
        self.metrics
            .entry(point.metric.clone())
            .or_default()
            .entry(point.timestamp)
            .or_default()
            .push(point);
    }

    /// Borrows the ordered map for one metric, if present.
    pub fn metric_map(&self, metric: &str) -> Option<&MetricMap> {
        self.metrics.get(metric)
    }

    /// Removes every observation with a timestamp strictly below `cutoff` and
    /// returns the number removed. Emptied metric entries stay in place.
    pub fn sweep_before(&mut self, cutoff: Timestamp) -> usize {
        let mut removed = 0;
        for map in self.metrics.values_mut() {
            let kept = map.split_off(&cutoff);
            removed += map.values().map(Vec::len).sum::<usize>();
            *map = kept;
        }
        removed
    }

    /// Number of distinct metrics seen (including ones emptied by the sweeper).
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Total number of indexed observations.
    pub fn point_count(&self) -> usize {
        self.metrics
            .values()
            .flat_map(|map| map.values())
            .map(Vec::len)
            .sum()
    }
}
