// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity catalog - the outcome vocabulary validation checks edges against.
//!
//! The runtime registers concrete activity implementations; the compiler only
//! needs to know which kinds exist and which outcomes each kind can produce.
//! That slice is captured here so this crate stays free of runtime concerns.

use std::collections::HashMap;

/// Declared metadata for one activity kind.
#[derive(Debug, Clone)]
pub struct ActivityDescriptor {
    /// Activity kind identifier (e.g. "SetVariable").
    pub kind: String,
    /// Outcome names this kind can produce, in declaration order.
    pub outcomes: Vec<String>,
}

/// Lookup table of activity kinds available to a workflow.
#[derive(Debug, Clone, Default)]
pub struct ActivityCatalog {
    kinds: HashMap<String, ActivityDescriptor>,
}

impl ActivityCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity kind with its outcome vocabulary.
    ///
    /// Registering the same kind twice replaces the earlier entry.
    pub fn register<K, O, S>(&mut self, kind: K, outcomes: O)
    where
        K: Into<String>,
        O: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = kind.into();
        let descriptor = ActivityDescriptor {
            kind: kind.clone(),
            outcomes: outcomes.into_iter().map(Into::into).collect(),
        };
        self.kinds.insert(kind, descriptor);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with<K, O, S>(mut self, kind: K, outcomes: O) -> Self
    where
        K: Into<String>,
        O: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(kind, outcomes);
        self
    }

    /// Check whether a kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Outcome vocabulary for a kind, if registered.
    pub fn outcomes(&self, kind: &str) -> Option<&[String]> {
        self.kinds.get(kind).map(|d| d.outcomes.as_slice())
    }

    /// All registered kind names.
    pub fn kind_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kinds.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// True when no kinds are registered.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let catalog = ActivityCatalog::new()
            .with("SetVariable", ["Done"])
            .with("ReceiveSignal", ["Done"])
            .with("Approval", ["Approved", "Rejected"]);

        assert_eq!(catalog.len(), 3);
        assert!(catalog.contains("Approval"));
        assert!(!catalog.contains("Unknown"));
        assert_eq!(
            catalog.outcomes("Approval"),
            Some(&["Approved".to_string(), "Rejected".to_string()][..])
        );
        assert_eq!(catalog.outcomes("Unknown"), None);
    }

    #[test]
    fn test_reregister_replaces() {
        let mut catalog = ActivityCatalog::new();
        catalog.register("Delay", ["Done"]);
        catalog.register("Delay", ["Done", "Skipped"]);
        assert_eq!(catalog.outcomes("Delay").map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_kind_names_sorted() {
        let catalog = ActivityCatalog::new()
            .with("Zeta", ["Done"])
            .with("Alpha", ["Done"]);
        assert_eq!(catalog.kind_names(), vec!["Alpha", "Zeta"]);
    }
}
