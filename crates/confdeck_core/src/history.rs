//! Bounded linear undo/redo history of document patches.

use crate::constants::DEFAULT_MAX_HISTORY;
use crate::diff::{apply_patch_in_place, Direction, Patch};
use serde_json::Value;

/// Cursor-addressed patch sequence with FIFO eviction.
///
/// Replaying `entries[..applied]` forward from the baseline reproduces the
/// current document. Pushing after an undo discards the redo tail.
#[derive(Debug, Clone)]
pub struct PatchHistory {
    entries: Vec<Patch>,
    applied: usize,
    max_entries: usize,
}

impl Default for PatchHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_HISTORY)
    }
}

impl PatchHistory {
    /// Create an empty history holding at most `max_entries` patches (minimum 1).
    pub fn with_limit(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            applied: 0,
            max_entries: max_entries.max(1),
        }
    }

    /// Record a new patch at the cursor.
    ///
    /// # Returns
    /// `false` when `patch` is empty and nothing was recorded.
    pub fn push(&mut self, patch: Patch) -> bool {
        if patch.is_empty() {
            return false;
        }
        self.entries.truncate(self.applied);
        self.entries.push(patch);
        while self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
        self.applied = self.entries.len();
        true
    }

    /// Revert the patch under the cursor in `document`.
    ///
    /// # Returns
    /// `false` when already at the baseline.
    pub fn undo(&mut self, document: &mut Value) -> bool {
        if self.applied == 0 {
            return false;
        }
        self.applied -= 1;
        apply_patch_in_place(document, &self.entries[self.applied], Direction::Backward);
        true
    }

    /// Re-apply the patch after the cursor in `document`.
    ///
    /// # Returns
    /// `false` when already at the most recent edit.
    pub fn redo(&mut self, document: &mut Value) -> bool {
        if self.applied >= self.entries.len() {
            return false;
        }
        apply_patch_in_place(document, &self.entries[self.applied], Direction::Forward);
        self.applied += 1;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.entries.len()
    }

    /// Index of the most recently applied patch; `None` at the baseline.
    pub fn cursor(&self) -> Option<usize> {
        self.applied.checked_sub(1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn entries(&self) -> &[Patch] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.applied = 0;
    }
}
