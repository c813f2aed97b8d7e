use std::collections::HashMap;

/// Timestamp type (milliseconds since Unix epoch).
pub type Timestamp = u64;

/// Value type.
pub type Value = f64;

/// TagSet type (using a HashMap for flexibility).
pub type TagSet = HashMap<String, String>;

/// A single tagged observation.
///
/// Points are immutable once inserted and have no identity beyond their field
/// contents; duplicates (same fields, or same metric and timestamp with
/// different tags or values) are permitted and preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub timestamp: Timestamp,
    pub metric: String,
    pub value: Value,
    pub tags: TagSet,
}
