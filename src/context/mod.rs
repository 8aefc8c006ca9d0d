//! The write context: a staging area where inserts, updates and deletes
//! accumulate until they are committed to the storage engine.

pub mod change;

pub use change::Change;

/// Pending changes of the one read/write context owned by a manager.
#[derive(Debug, Default)]
pub struct Context {
    changes: Vec<Change>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything is waiting to be committed
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn pending(&self) -> &[Change] {
        &self.changes
    }

    pub fn stage(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Hand the pending batch to a commit, leaving the context clean.
    pub fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    /// Discard every pending change.
    pub fn rollback(&mut self) {
        self.changes.clear();
    }
}
