// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};

/// Records named events from anywhere in a test so that their order can be asserted afterwards.
///
/// Clones share the same journal, so one clone can be moved into each factory or teardown hook.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    ///
    /// # Panics
    ///
    /// Panics if another thread panicked while holding the journal.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    /// Returns a snapshot of every entry in recording order.
    ///
    /// # Panics
    ///
    /// Panics if another thread panicked while holding the journal.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Forgets every entry recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if another thread panicked while holding the journal.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of times `entry` was recorded.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|recorded| *recorded == entry).count()
    }

    /// Position of the first occurrence of `entry`.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|recorded| recorded == entry)
    }

    /// Asserts that both entries were recorded and that `first` came before `second`.
    ///
    /// # Panics
    ///
    /// Panics if either entry is missing or they were recorded in the other order.
    pub fn assert_before(&self, first: &str, second: &str) {
        let entries = self.entries();
        let first_position = entries.iter().position(|recorded| recorded == first);
        let second_position = entries.iter().position(|recorded| recorded == second);

        match (first_position, second_position) {
            (Some(a), Some(b)) => assert!(a < b, "expected '{first}' before '{second}', got {entries:?}"),
            _ => panic!("expected both '{first}' and '{second}' to be recorded, got {entries:?}"),
        }
    }
}
