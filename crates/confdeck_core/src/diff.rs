//! Structural diff and patch application over configuration documents.
//!
//! Objects are diffed key by key; every other kind of value (including
//! arrays) is compared as a whole and replaced as a single entry.

use crate::path::{insert_in, write_in, DocPath, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of a patch to write when applying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Write each entry's `next` value.
    Forward,
    /// Write each entry's `previous` value.
    Backward,
}

/// One changed location; `None` marks an absent value (insertion/deletion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub path: DocPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Value>,
    /// For an inserted or deleted object key, its index within the parent
    /// object on the side where it is present. Re-inserting the key puts it
    /// back at that index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl PatchEntry {
    fn side(&self, direction: Direction) -> Option<&Value> {
        match direction {
            Direction::Forward => self.next.as_ref(),
            Direction::Backward => self.previous.as_ref(),
        }
    }
}

/// Ordered set of entries whose paths address disjoint subtrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    entries: Vec<PatchEntry>,
}

impl Patch {
    /// Patch replacing the whole document in one root-path entry.
    ///
    /// # Returns
    /// An empty patch when both documents are already equal.
    pub fn replace_root(previous: &Value, next: &Value) -> Self {
        if previous == next {
            return Self::default();
        }
        Self {
            entries: vec![PatchEntry {
                path: DocPath::root(),
                previous: Some(previous.clone()),
                next: Some(next.clone()),
                position: None,
            }],
        }
    }

    pub fn entries(&self) -> &[PatchEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when no entry path is a strict prefix of another entry path.
    pub fn paths_are_disjoint(&self) -> bool {
        self.entries.iter().enumerate().all(|(i, a)| {
            self.entries
                .iter()
                .enumerate()
                .all(|(j, b)| i == j || !a.path.is_strict_prefix_of(&b.path))
        })
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchEntry;
    type IntoIter = std::slice::Iter<'a, PatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Compute the minimal set of changed locations between two documents.
///
/// # Returns
/// An empty [`Patch`] when `previous == next`.
pub fn compute_patch(previous: &Value, next: &Value) -> Patch {
    let mut entries = Vec::new();
    let mut path = DocPath::root();
    diff_at(&mut entries, &mut path, Some(previous), Some(next), None);
    Patch { entries }
}

fn diff_at(
    entries: &mut Vec<PatchEntry>,
    path: &mut DocPath,
    previous: Option<&Value>,
    next: Option<&Value>,
    position: Option<usize>,
) {
    if previous == next {
        return;
    }
    match (previous, next) {
        (Some(Value::Object(before)), Some(Value::Object(after))) => {
            for (index, (key, value)) in before.iter().enumerate() {
                path.push(key.as_str());
                diff_at(entries, path, Some(value), after.get(key), Some(index));
                path.pop();
            }
            for (index, (key, value)) in after.iter().enumerate() {
                if before.contains_key(key) {
                    continue;
                }
                path.push(key.as_str());
                diff_at(entries, path, None, Some(value), Some(index));
                path.pop();
            }
        }
        _ => entries.push(PatchEntry {
            path: path.clone(),
            previous: previous.cloned(),
            next: next.cloned(),
            position: if previous.is_some() && next.is_some() {
                None
            } else {
                position
            },
        }),
    }
}

/// Apply `patch` to a copy of `base`.
///
/// # Returns
/// The patched document; `base` is left untouched.
pub fn apply_patch(base: &Value, patch: &Patch, direction: Direction) -> Value {
    let mut document = base.clone();
    apply_patch_in_place(&mut document, patch, direction);
    document
}

/// Apply `patch` directly to `document`.
///
/// Entry paths are disjoint, so values do not depend on entry order. Keys
/// carrying a `position` are inserted last, lowest position first, so a
/// reverted deletion lands back where the key was.
pub fn apply_patch_in_place(document: &mut Value, patch: &Patch, direction: Direction) {
    let mut placed = Vec::new();
    for entry in patch {
        let value = entry.side(direction);
        let keyed = matches!(entry.path.segments().last(), Some(PathSegment::Key(_)));
        match (value, entry.position) {
            (Some(value), Some(position)) if keyed => placed.push((position, entry, value)),
            (value, _) => write_in(document, &entry.path, value.cloned()),
        }
    }
    placed.sort_by_key(|(position, _, _)| *position);
    for (position, entry, value) in placed {
        insert_in(document, &entry.path, value.clone(), position);
    }
}
