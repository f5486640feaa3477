// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Process-wide token accounting, keyed by model alias.
///
/// Cheap to clone; all clones share the same counters.  The engine records
/// every completion against it, and tools that invoke the summarization
/// service record through the same handle.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    usage: Arc<Mutex<HashMap<String, u64>>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, model_alias: &str, tokens: u64) {
        let mut usage = self.usage.lock().expect("usage lock");
        *usage.entry(model_alias.to_string()).or_insert(0) += tokens;
    }

    pub fn total(&self, model_alias: &str) -> u64 {
        self.usage
            .lock()
            .expect("usage lock")
            .get(model_alias)
            .copied()
            .unwrap_or(0)
    }

    /// Sorted `(alias, tokens)` pairs for end-of-run reporting.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let usage = self.usage.lock().expect("usage lock");
        let mut pairs: Vec<(String, u64)> = usage.iter().map(|(k, v)| (k.clone(), *v)).collect();
        pairs.sort();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_per_alias() {
        let t = UsageTracker::new();
        t.add("gf", 100);
        t.add("gf", 50);
        t.add("lfm", 7);
        assert_eq!(t.total("gf"), 150);
        assert_eq!(t.total("lfm"), 7);
    }

    #[test]
    fn unknown_alias_is_zero() {
        let t = UsageTracker::new();
        assert_eq!(t.total("nope"), 0);
    }

    #[test]
    fn clones_share_counters() {
        let t = UsageTracker::new();
        let c = t.clone();
        c.add("gf", 10);
        assert_eq!(t.total("gf"), 10);
    }

    #[test]
    fn snapshot_is_sorted() {
        let t = UsageTracker::new();
        t.add("zeta", 1);
        t.add("alpha", 2);
        let snap = t.snapshot();
        assert_eq!(snap[0].0, "alpha");
        assert_eq!(snap[1].0, "zeta");
    }
}
