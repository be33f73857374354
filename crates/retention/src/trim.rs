//! Count-ranked trimming of bounded mappings.

use {
    serde_json::{Map, Value},
    tracing::debug,
};

/// Result of [`trim_by_count`].
#[derive(Debug, Clone, PartialEq)]
pub struct Trimmed {
    pub kept: Map<String, Value>,
    pub dropped: usize,
}

/// Ranking key of a stats entry: its numeric `count` field.
///
/// Missing, non-numeric, or non-object entries rank as `0`.
#[must_use]
pub fn rank_count(entry: &Value) -> f64 {
    entry
        .as_object()
        .and_then(|obj| obj.get("count"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Keep the `capacity` highest-ranked entries of `map`.
///
/// A map already within capacity comes back unchanged. Otherwise the result
/// is ordered by descending count; equal counts keep their document order.
#[must_use]
pub fn trim_by_count(map: &Map<String, Value>, capacity: usize) -> Trimmed {
    if map.len() <= capacity {
        return Trimmed {
            kept: map.clone(),
            dropped: 0,
        };
    }

    let mut ranked: Vec<(f64, &String, &Value)> = map
        .iter()
        .map(|(key, value)| {
            if !value.is_object() {
                debug!(key = %key, "stats entry is not an object; ranked as 0");
            }
            (rank_count(value), key, value)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let kept: Map<String, Value> = ranked
        .into_iter()
        .take(capacity)
        .map(|(_, key, value)| (key.clone(), value.clone()))
        .collect();
    Trimmed {
        dropped: map.len() - kept.len(),
        kept,
    }
}
