use crate::index::SeriesIndex;
use crate::types::{DataPoint, TagSet, Timestamp};
use rayon::prelude::*;

/// Executes a range query against the index.
///
/// # Arguments
/// * `index` - The index to scan (caller holds the read side of the store lock).
/// * `metric` - The metric to query.
/// * `time_start` / `time_end` - Half-open window `[time_start, time_end)`.
/// * `filters` - Optional tag filter. Only observations carrying every
///   key-value pair in the filter are returned; `None` or an empty filter
///   admits everything.
///
/// # Returns
/// Matching observations ordered by timestamp ascending, ties broken by
/// insertion order. An unknown metric or a window with `time_end <=
/// time_start` yields an empty list.
pub fn execute_query(
    index: &SeriesIndex,
    metric: &str,
    time_start: Timestamp,
    time_end: Timestamp,
    filters: Option<&TagSet>,
) -> Vec<DataPoint> {
    if time_end <= time_start {
        return Vec::new();
    }
    let Some(map) = index.metric_map(metric) else {
        return Vec::new();
    };

    // Flatten the window first; the parallel filter preserves input order on
    // collect, keeping timestamp order and bucket order intact.
    let window: Vec<&DataPoint> = map
        .range(time_start..time_end)
        .flat_map(|(_, bucket)| bucket.iter())
        .collect();

    window
        .into_par_iter()
        .filter(|point| matches_filters(point, filters))
        .cloned()
        .collect()
}

/// Checks whether an observation's tags contain every key-value pair in the
/// filter. A missing or empty filter admits everything.
#[inline]
pub fn matches_filters(point: &DataPoint, filters: Option<&TagSet>) -> bool {
    let Some(filter) = filters else {
        return true;
    };
    if filter.is_empty() {
        return true;
    }
    // The point must carry at least as many tags as the filter asks for.
    if point.tags.len() < filter.len() {
        return false;
    }
    filter
        .iter()
        .all(|(key, value)| point.tags.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_tags(pairs: &[(&str, &str)]) -> TagSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn point(metric: &str, ts: Timestamp, value: f64, tags: TagSet) -> DataPoint {
        DataPoint {
            timestamp: ts,
            metric: metric.to_string(),
            value,
            tags,
        }
    }

    fn populated_index() -> SeriesIndex {
        let mut index = SeriesIndex::default();
        index.insert(point(
            "cpu.usage",
            100,
            1.0,
            create_tags(&[("host", "server1"), ("region", "us-east")]),
        ));
        index.insert(point(
            "cpu.usage",
            200,
            2.0,
            create_tags(&[("host", "server2"), ("region", "us-east")]),
        ));
        index.insert(point(
            "cpu.usage",
            300,
            3.0,
            create_tags(&[("host", "server3"), ("region", "us-west")]),
        ));
        index
    }

    #[test]
    fn query_time_window_is_half_open() {
        let index = populated_index();

        let all = execute_query(&index, "cpu.usage", 100, 301, None);
        assert_eq!(all.len(), 3);

        // Upper bound exclusive.
        let partial = execute_query(&index, "cpu.usage", 100, 300, None);
        assert_eq!(partial.len(), 2);
        assert_eq!(partial[0].timestamp, 100);
        assert_eq!(partial[1].timestamp, 200);

        // Lower bound inclusive.
        let from_200 = execute_query(&index, "cpu.usage", 200, 301, None);
        assert_eq!(from_200.len(), 2);
    }

    #[test]
    fn degenerate_window_yields_empty() {
        let index = populated_index();
        assert!(execute_query(&index, "cpu.usage", 200, 200, None).is_empty());
        assert!(execute_query(&index, "cpu.usage", 300, 100, None).is_empty());
    }

    #[test]
    fn unknown_metric_yields_empty() {
        let index = populated_index();
        assert!(execute_query(&index, "no.such.metric", 0, u64::MAX, None).is_empty());
    }

    #[test]
    fn filter_selects_subset_matches() {
        let index = populated_index();

        let east = create_tags(&[("region", "us-east")]);
        let results = execute_query(&index, "cpu.usage", 0, u64::MAX, Some(&east));
        assert_eq!(results.len(), 2);

        let host1 = create_tags(&[("host", "server1")]);
        let results = execute_query(&index, "cpu.usage", 0, u64::MAX, Some(&host1));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 1.0);

        let both = create_tags(&[("host", "server2"), ("region", "us-east")]);
        let results = execute_query(&index, "cpu.usage", 0, u64::MAX, Some(&both));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 2.0);

        let nothing = create_tags(&[("host", "serverX")]);
        assert!(execute_query(&index, "cpu.usage", 0, u64::MAX, Some(&nothing)).is_empty());
    }

    #[test]
    fn empty_filter_admits_everything() {
        let index = populated_index();
        let empty = TagSet::new();
        assert_eq!(
            execute_query(&index, "cpu.usage", 0, u64::MAX, Some(&empty)).len(),
            3
        );
        assert_eq!(execute_query(&index, "cpu.usage", 0, u64::MAX, None).len(), 3);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = SeriesIndex::default();
        index.insert(point("m", 100, 1.0, create_tags(&[("host", "a")])));
        index.insert(point("m", 100, 2.0, create_tags(&[("host", "b")])));
        index.insert(point("m", 100, 3.0, create_tags(&[("host", "c")])));

        let results = execute_query(&index, "m", 100, 101, None);
        let values: Vec<f64> = results.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn matches_filters_subset_semantics() {
        let tags = create_tags(&[("host", "server1"), ("region", "us-east")]);
        let p = point("m", 1, 1.0, tags);

        assert!(matches_filters(&p, None));
        assert!(matches_filters(&p, Some(&TagSet::new())));
        assert!(matches_filters(&p, Some(&create_tags(&[("host", "server1")]))));
        assert!(matches_filters(
            &p,
            Some(&create_tags(&[("host", "server1"), ("region", "us-east")]))
        ));
        assert!(!matches_filters(&p, Some(&create_tags(&[("host", "server2")]))));
        assert!(!matches_filters(&p, Some(&create_tags(&[("absent", "x")]))));
        assert!(!matches_filters(
            &p,
            Some(&create_tags(&[
                ("host", "server1"),
                ("region", "us-east"),
                ("extra", "tag")
            ]))
        ));

        let untagged = point("m", 1, 1.0, TagSet::new());
        assert!(matches_filters(&untagged, None));
        assert!(!matches_filters(&untagged, Some(&create_tags(&[("host", "a")]))));
    }
}
