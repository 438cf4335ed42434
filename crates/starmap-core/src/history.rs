//! Browsing history with a cursor.
//!
//! Conventional browser semantics: appending while the cursor is behind the
//! tail cuts the forward branch first; back/forward/breadcrumb travel
//! overwrites the entry at the target index instead of appending.

use crate::fault::NavFault;
use serde::{Deserialize, Serialize};

/// How a committed travel updates history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryUpdate {
    /// Truncate after the cursor, append, move the cursor to the tail.
    Push,
    /// Overwrite the entry at this index and move the cursor there.
    ReplaceAt(usize),
}

/// One breadcrumb for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub index: usize,
    pub title: String,
    pub active: bool,
}

/// Ordered visited titles plus cursor.
///
/// Invariant: the cursor is `None` iff the history is empty, otherwise it
/// indexes an existing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<String>,
    cursor: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Cursor as a signed index, `-1` when empty.
    pub fn index(&self) -> isize {
        self.cursor.map_or(-1, |c| c as isize)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn current(&self) -> Option<&str> {
        self.cursor.and_then(|c| self.get(c))
    }

    pub fn is_at_tail(&self) -> bool {
        match self.cursor {
            Some(c) => c + 1 == self.entries.len(),
            None => true,
        }
    }

    /// Entry before the cursor: the path back along the chain.
    pub fn chain_prev(&self) -> Option<&str> {
        self.prev_entry().map(|(_, t)| t)
    }

    pub fn prev_entry(&self) -> Option<(usize, &str)> {
        let c = self.cursor?;
        let i = c.checked_sub(1)?;
        self.get(i).map(|t| (i, t))
    }

    pub fn next_entry(&self) -> Option<(usize, &str)> {
        let i = self.cursor? + 1;
        self.get(i).map(|t| (i, t))
    }

    /// Append `title`, cutting any forward branch. Returns true if entries
    /// were discarded.
    pub fn push(&mut self, title: impl Into<String>) -> bool {
        let truncated = match self.cursor {
            Some(c) if c + 1 < self.entries.len() => {
                self.entries.truncate(c + 1);
                true
            }
            _ => false,
        };
        self.entries.push(title.into());
        self.cursor = Some(self.entries.len() - 1);
        truncated
    }

    /// Overwrite the entry at `index` and point the cursor at it.
    pub fn replace_at(&mut self, index: usize, title: impl Into<String>) -> Result<(), NavFault> {
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or(NavFault::HistoryIndexOutOfRange { index, len })?;
        *slot = title.into();
        self.cursor = Some(index);
        Ok(())
    }

    /// Apply a travel's history update. Returns true if a forward branch was
    /// cut.
    pub fn apply(&mut self, update: HistoryUpdate, title: &str) -> Result<bool, NavFault> {
        match update {
            HistoryUpdate::Push => Ok(self.push(title)),
            HistoryUpdate::ReplaceAt(index) => self.replace_at(index, title).map(|_| false),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, title)| Breadcrumb {
                index,
                title: title.clone(),
                active: Some(index) == self.cursor,
            })
            .collect()
    }
}
