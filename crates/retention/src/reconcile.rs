//! Color-map trimming driven by participant membership.

use serde_json::{Map, Value};

/// Result of [`reconcile_colors`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub kept: Map<String, Value>,
    pub removed: usize,
}

/// Shrink `color_map` to `capacity`, keeping active users first.
///
/// Active users present in the map are taken in `active` order, then the
/// remaining slots are filled with the other entries in document order.
/// Run this after participants are trimmed so `active` is the post-trim set.
#[must_use]
pub fn reconcile_colors<'a>(
    color_map: &Map<String, Value>,
    active: impl IntoIterator<Item = &'a str>,
    capacity: usize,
) -> Reconciled {
    if color_map.len() <= capacity {
        return Reconciled {
            kept: color_map.clone(),
            removed: 0,
        };
    }

    let mut kept = Map::new();
    for user in active {
        if kept.len() >= capacity {
            break;
        }
        if let Some(color) = color_map.get(user) {
            kept.insert(user.to_string(), color.clone());
        }
    }
    for (user, color) in color_map {
        if kept.len() >= capacity {
            break;
        }
        if !kept.contains_key(user) {
            kept.insert(user.clone(), color.clone());
        }
    }

    Reconciled {
        removed: color_map.len() - kept.len(),
        kept,
    }
}
