// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Dotted field paths over JSON-like trees.
//!
//! A field path is a dot-delimited string such as `"address.city"`. This module resolves such
//! paths against two kinds of storage:
//!
//! - **Nested values** (`serde_json::Value`), where each segment descends one level. This is how
//!   content is read and how pending changes are committed into it.
//! - **Flat path maps** ([`PathMap`]), where the full dotted path is a single key. This is how a
//!   changeset stores its changes and errors, so that editing `"address.city"` never requires
//!   decomposing the value stored under `"address"`.
//!
//! Flat path maps keep one invariant: no stored key is an ancestor of another stored key. Writing
//! with [`set_flat`] evicts both ancestors and descendants of the written key.

use crate::{ChangesetError, PathMap};
use serde_json::{Map, Value};
use smallvec::SmallVec;

/// The segments of a dotted path. Most paths are shallow, so they live on the stack.
pub type Segments<'p> = SmallVec<[&'p str; 4]>;

/// Splits a dotted path into its segments.
pub fn segments(path: &str) -> Segments<'_> {
    path.split('.').collect()
}

/// Splits `path` into its first segment and the remainder, if it has more than one segment.
pub fn split_base(path: &str) -> Option<(&str, &str)> {
    path.split_once('.')
}

/// Returns `true` if `ancestor` is a strict path-prefix of `path`.
///
/// `"a"` is an ancestor of `"a.b"` but not of `"ab"` or of `"a"` itself.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}

fn array_index(segment: &str, len: usize) -> Option<usize> {
    segment.parse::<usize>().ok().filter(|&index| index < len)
}

/// Resolves `path` through nested objects (and in-range array indices) of `root`.
///
/// Returns `None` as soon as a segment is missing or a scalar is reached before the last segment.
pub fn get<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => array_index(segment, items.len()).map(|index| &items[index]),
        _ => None,
    })
}

/// Mutable counterpart of [`get`].
pub fn get_mut<'v>(root: &'v mut Value, path: &str) -> Option<&'v mut Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => {
            let len = items.len();
            array_index(segment, len).map(move |index| &mut items[index])
        }
        _ => None,
    })
}

/// Deep-writes `value` at `path` inside `root`.
///
/// Intermediate levels are created as empty objects when missing. An intermediate scalar is
/// replaced by an object, and so is a non-container root. Sibling keys along the way are kept.
pub fn set(root: &mut Value, path: &str, value: Value) {
    let segments = segments(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut node = root;
    for segment in parents {
        node = descend_or_create(node, segment);
    }
    let index = match node {
        Value::Array(items) => array_index(last, items.len()),
        _ => None,
    };
    match (index, node) {
        (Some(index), Value::Array(items)) => items[index] = value,
        (_, node) => {
            object_mut(node).insert((*last).to_owned(), value);
        }
    }
}

fn descend_or_create<'v>(node: &'v mut Value, segment: &str) -> &'v mut Value {
    let index = match node {
        Value::Array(items) => array_index(segment, items.len()),
        _ => None,
    };
    match (index, node) {
        (Some(index), Value::Array(items)) => &mut items[index],
        (_, node) => {
            let child = object_mut(node)
                .entry(segment.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !matches!(child, Value::Object(_) | Value::Array(_)) {
                *child = Value::Object(Map::new());
            }
            child
        }
    }
}

fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}

/// Removes and returns the value at `path`, if it exists in an object.
pub fn delete(root: &mut Value, path: &str) -> Option<Value> {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (get_mut(root, parent)?, last),
        None => (root, path),
    };
    parent.as_object_mut()?.remove(last)
}

/// Writes `value` under the full dotted `key` of a flat path map.
///
/// Any stored ancestor (`"a"` when writing `"a.b"`) or descendant (`"a.b"` when writing `"a"`)
/// is removed first, since it would otherwise override the new entry.
pub fn set_flat<V>(map: &mut PathMap<V>, key: &str, value: V) {
    map.retain(|existing, _| !is_ancestor(key, existing) && !is_ancestor(existing, key));
    map.insert(key.to_owned(), value);
}

/// Builds a nested object out of a flat path map.
///
/// Keys are applied in sorted order, so a shorter path never overwrites a deeper one that was
/// applied earlier.
pub fn inflate<V>(map: &PathMap<V>, mut transform: impl FnMut(&V) -> Value) -> Value {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let mut inflated = Value::Object(Map::new());
    for key in keys {
        set(&mut inflated, key, transform(&map[key.as_str()]));
    }
    inflated
}

/// Rejects key sets in which one key is an ancestor of another.
///
/// `label` names the offending input in the resulting error.
pub fn check_overlap<'k>(
    label: &'static str,
    keys: impl IntoIterator<Item = &'k str> + Clone,
) -> Result<(), ChangesetError> {
    for key in keys.clone() {
        for (end, _) in key.match_indices('.') {
            let prefix = &key[..end];
            if keys.clone().into_iter().any(|other| other == prefix) {
                return Err(ChangesetError::OverlappingKeys {
                    label,
                    path: prefix.to_owned(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_map;
    use serde_json::json;

    #[test]
    fn get_resolves_nested_objects_and_arrays() {
        let root = json!({ "user": { "name": "Al", "tags": ["a", "b"] } });
        assert_eq!(get(&root, "user.name"), Some(&json!("Al")));
        assert_eq!(get(&root, "user.tags.1"), Some(&json!("b")));
        assert_eq!(get(&root, "user.tags.2"), None);
        assert_eq!(get(&root, "user.name.first"), None);
        assert_eq!(get(&root, "missing.deeply"), None);
    }

    #[test]
    fn set_creates_intermediate_levels_and_keeps_siblings() {
        let mut root = json!({ "user": { "name": "Al" }, "age": 3 });
        set(&mut root, "user.address.city", json!("Oslo"));
        assert_eq!(
            root,
            json!({ "user": { "name": "Al", "address": { "city": "Oslo" } }, "age": 3 })
        );
    }

    #[test]
    fn set_replaces_scalar_intermediates() {
        let mut root = json!({ "user": 5 });
        set(&mut root, "user.name", json!("Bob"));
        assert_eq!(root, json!({ "user": { "name": "Bob" } }));
    }

    #[test]
    fn set_writes_into_existing_array_slots() {
        let mut root = json!({ "tags": ["a", "b"] });
        set(&mut root, "tags.0", json!("z"));
        assert_eq!(root, json!({ "tags": ["z", "b"] }));
    }

    #[test]
    fn delete_removes_leaf_only() {
        let mut root = json!({ "user": { "name": "Al", "age": 3 } });
        assert_eq!(delete(&mut root, "user.name"), Some(json!("Al")));
        assert_eq!(delete(&mut root, "user.name"), None);
        assert_eq!(root, json!({ "user": { "age": 3 } }));
    }

    #[test]
    fn ancestry_is_segment_aware() {
        assert!(is_ancestor("a", "a.b"));
        assert!(is_ancestor("a.b", "a.b.c"));
        assert!(!is_ancestor("a", "ab"));
        assert!(!is_ancestor("a", "a"));
        assert!(!is_ancestor("a.b", "a"));
    }

    #[test]
    fn set_flat_evicts_ancestors_and_descendants() {
        let mut map = create_map();
        set_flat(&mut map, "user.name", 1);
        set_flat(&mut map, "user.age", 2);
        set_flat(&mut map, "username", 3);
        set_flat(&mut map, "user", 4);
        assert_eq!(
            map.iter().map(|(k, v)| (k.as_str(), *v)).collect::<Vec<_>>(),
            vec![("username", 3), ("user", 4)]
        );

        set_flat(&mut map, "user.name", 5);
        assert_eq!(
            map.iter().map(|(k, v)| (k.as_str(), *v)).collect::<Vec<_>>(),
            vec![("username", 3), ("user.name", 5)]
        );
    }

    #[test]
    fn inflate_nests_dotted_keys() {
        let mut map = create_map();
        map.insert("user.name".to_owned(), "Bob");
        map.insert("age".to_owned(), "3");
        map.insert("user.address.city".to_owned(), "Oslo");
        let inflated = inflate(&map, |v| json!(v));
        assert_eq!(
            inflated,
            json!({ "age": "3", "user": { "name": "Bob", "address": { "city": "Oslo" } } })
        );
    }

    #[test]
    fn overlap_check_reports_the_shadowed_ancestor() {
        assert!(check_overlap("changes", ["a.b", "a.c", "b"]).is_ok());
        let err = check_overlap("changes", ["a.b.c", "x", "a.b"]).unwrap_err();
        assert!(matches!(
            err,
            ChangesetError::OverlappingKeys { label: "changes", ref path } if path == "a.b"
        ));
    }
}
