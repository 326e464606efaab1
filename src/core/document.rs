//! Recursive get / set / unset over a JSON document addressed by [`KeyPath`].
//!
//! Objects are created on demand while setting. Arrays are indexed by
//! numeric segments; an index equal to the length appends. Descending into
//! a scalar is an error rather than a silent overwrite.

use serde_json::{Map, Value};

use crate::schema::path::{KeyPath, PathError};

pub fn get<'a>(doc: &'a Value, path: &KeyPath) -> Option<&'a Value> {
    get_segments(doc, path.segments())
}

fn get_segments<'a>(node: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(node);
    };
    let child = match node {
        Value::Object(map) => map.get(head)?,
        Value::Array(items) => items.get(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    get_segments(child, rest)
}

pub fn get_mut<'a>(doc: &'a mut Value, path: &KeyPath) -> Option<&'a mut Value> {
    let mut node = doc;
    for segment in path.segments() {
        node = match node {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Write `value` at `path`, creating intermediate objects. A `null` document
/// becomes an object first.
pub fn set(doc: &mut Value, path: &KeyPath, value: Value) -> Result<(), PathError> {
    if doc.is_null() {
        *doc = Value::Object(Map::new());
    }
    set_segments(doc, path.segments(), value, path)
}

fn set_segments(
    node: &mut Value,
    segments: &[String],
    value: Value,
    full: &KeyPath,
) -> Result<(), PathError> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    match node {
        Value::Object(map) => {
            if rest.is_empty() {
                map.insert(head.clone(), value);
                return Ok(());
            }
            let child = map
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if child.is_null() {
                *child = Value::Object(Map::new());
            }
            set_segments(child, rest, value, full)
        }
        Value::Array(items) => {
            let index = head
                .parse::<usize>()
                .map_err(|_| PathError::NotAContainer(full.to_string()))?;
            if index == items.len() {
                items.push(if rest.is_empty() {
                    Value::Null
                } else {
                    Value::Object(Map::new())
                });
            }
            let child = items.get_mut(index).ok_or_else(|| PathError::IndexOutOfBounds {
                index,
                path: full.to_string(),
            })?;
            set_segments(child, rest, value, full)
        }
        _ => Err(PathError::NotAContainer(full.to_string())),
    }
}

/// Remove the value at `path`, returning it. Missing paths are a no-op.
pub fn unset(doc: &mut Value, path: &KeyPath) -> Option<Value> {
    let (parent, last) = match path.parent() {
        Some(parent) => (get_mut(doc, &parent)?, path.last()),
        None => (doc, path.last()),
    };
    match parent {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}
