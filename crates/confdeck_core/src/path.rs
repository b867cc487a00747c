//! Document paths and tree navigation helpers.
//!
//! A [`DocPath`] is an ordered list of object keys and array indices. The
//! empty path addresses the document root.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Largest number of `null` slots a single write may add past the end of an
/// array. Writes beyond that are ignored.
pub const MAX_ARRAY_PADDING: usize = 1024;

/// One step into a document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array element position.
    Index(usize),
    /// Object field name.
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        Self::Key(value.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        Self::Key(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Key(key) => f.write_str(key),
        }
    }
}

/// Location of a node inside a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(Vec<PathSegment>);

impl DocPath {
    /// Path addressing the document root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path such as `gateway.port` or `tools.allow.0`.
    ///
    /// Segments made only of ASCII digits become array indices; everything
    /// else is an object key. Empty input yields the root path and empty
    /// segments are skipped.
    pub fn parse_dotted(text: &str) -> Self {
        text.split('.')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                if segment.bytes().all(|b| b.is_ascii_digit()) {
                    segment
                        .parse::<usize>()
                        .map(PathSegment::Index)
                        .unwrap_or_else(|_| PathSegment::Key(segment.to_string()))
                } else {
                    PathSegment::Key(segment.to_string())
                }
            })
            .collect()
    }

    /// Parse a dotted path by walking `document`.
    ///
    /// An all-digit segment is an array index only when the node it steps
    /// into is an array; otherwise it is an object key, so numeric keys such
    /// as `ports.80` stay keys. Segments past the end of the existing tree
    /// are keys.
    pub fn resolve_dotted(document: &Value, text: &str) -> Self {
        let mut node = Some(document);
        let mut path = Self::root();
        for segment in text.split('.').filter(|segment| !segment.is_empty()) {
            let index = match node {
                Some(Value::Array(_)) if segment.bytes().all(|b| b.is_ascii_digit()) => {
                    segment.parse::<usize>().ok()
                }
                _ => None,
            };
            let step = match index {
                Some(index) => PathSegment::Index(index),
                None => PathSegment::Key(segment.to_string()),
            };
            node = node.and_then(|current| match (current, &step) {
                (Value::Object(map), PathSegment::Key(key)) => map.get(key),
                (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
                _ => None,
            });
            path.push(step);
        }
        path
    }

    /// Render the path with `.` separators; the root renders as an empty string.
    pub fn to_dotted(&self) -> String {
        self.0
            .iter()
            .map(PathSegment::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Return a new path extended by one segment.
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut next = self.clone();
        next.0.push(segment.into());
        next
    }

    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.0.push(segment.into());
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` when `self` is a proper ancestor of `other`.
    pub fn is_strict_prefix_of(&self, other: &DocPath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

impl FromIterator<PathSegment> for DocPath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<S: Into<PathSegment>, const N: usize> From<[S; N]> for DocPath {
    fn from(segments: [S; N]) -> Self {
        segments.into_iter().map(Into::into).collect()
    }
}

impl From<Vec<PathSegment>> for DocPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

/// Read the value at `path`, if every segment resolves.
pub fn get_in<'a>(root: &'a Value, path: &DocPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| match (node, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key),
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        })
}

fn get_mut_in<'a>(root: &'a mut Value, segments: &[PathSegment]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| match (node, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
            (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
            _ => None,
        })
}

fn child_slot<'a>(node: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match segment {
        PathSegment::Key(key) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node.as_object_mut()
                .map(|map| map.entry(key.clone()).or_insert(Value::Null))
        }
        PathSegment::Index(index) => {
            if !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            node.as_array_mut().and_then(|items| {
                if items.len() <= *index {
                    // Checked up front by `padding_exceeded`.
                    items.resize(*index + 1, Value::Null);
                }
                items.get_mut(*index)
            })
        }
    }
}

/// `true` when writing at `path` would pad some array with more than
/// [`MAX_ARRAY_PADDING`] nulls.
fn padding_exceeded(root: &Value, path: &DocPath) -> bool {
    let mut node = Some(root);
    for segment in path.segments() {
        if let PathSegment::Index(index) = segment {
            let len = node.and_then(Value::as_array).map_or(0, Vec::len);
            if index.saturating_sub(len) > MAX_ARRAY_PADDING {
                return true;
            }
        }
        node = node.and_then(|current| match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key),
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        });
    }
    false
}

/// Insert `value` under a key at `position` within its parent object.
///
/// Falls back to [`write_in`] when the key already exists, the parent is
/// not an object or the last segment is an index. `position` is clamped to
/// the parent's length.
pub fn insert_in(root: &mut Value, path: &DocPath, value: Value, position: usize) {
    if let Some((PathSegment::Key(key), parents)) = path.segments().split_last() {
        if let Some(Value::Object(map)) = get_mut_in(root, parents) {
            if !map.contains_key(key) {
                let position = position.min(map.len());
                map.shift_insert(position, key.clone(), value);
                return;
            }
        }
    }
    write_in(root, path, Some(value));
}

/// Write `value` at `path`, or remove the node there when `value` is `None`.
///
/// Writes create missing containers along the way (an object for a key
/// segment, an array for an index segment) and replace intermediate nodes of
/// the wrong kind. Writing past the end of an array pads with `null`, up to
/// [`MAX_ARRAY_PADDING`] slots; a write needing more leaves `root` untouched.
/// Removal deletes the object key or the array element (shifting later
/// elements down) and is a no-op when the path does not resolve. Removing the
/// root leaves `null`.
pub fn write_in(root: &mut Value, path: &DocPath, value: Option<Value>) {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = value.unwrap_or(Value::Null);
        return;
    };

    let Some(value) = value else {
        match (get_mut_in(root, parents), last) {
            (Some(Value::Object(map)), PathSegment::Key(key)) => {
                map.shift_remove(key);
            }
            (Some(Value::Array(items)), PathSegment::Index(index)) if *index < items.len() => {
                items.remove(*index);
            }
            _ => {}
        }
        return;
    };

    if padding_exceeded(root, path) {
        return;
    }
    let slot = path
        .segments()
        .iter()
        .try_fold(root, |node, segment| child_slot(node, segment));
    if let Some(slot) = slot {
        *slot = value;
    }
}
