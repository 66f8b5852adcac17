//! Process-wide caller-identity → branch registry.
//!
//! Structurally a translation of the original trivial dict-backed
//! registry, but reads/writes go through `DashMap` (already part of the
//! teacher's dependency stack) rather than a single global mutex, since
//! the spec only requires mutual exclusion per key, not a single global
//! critical section.

use dashmap::DashMap;

#[derive(Default)]
pub struct Registry {
    bindings: DashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// Bind `caller` to `branch`, replacing any prior assignment.
    pub fn register(&self, caller: impl Into<String>, branch: impl Into<String>) {
        self.bindings.insert(caller.into(), branch.into());
    }

    /// Remove the binding for `caller`, returning the branch it was bound
    /// to, if any.
    pub fn deregister(&self, caller: &str) -> Option<String> {
        self.bindings.remove(caller).map(|(_, branch)| branch)
    }

    /// Look up the branch bound to `caller`. Absent is an explicit,
    /// reportable condition at call sites — never silently "allowed".
    pub fn get_branch(&self, caller: &str) -> Option<String> {
        self.bindings.get(caller).map(|entry| entry.clone())
    }

    /// Snapshot of every binding, safe against concurrent modification.
    pub fn list_all(&self) -> std::collections::HashMap<String, String> {
        self.bindings
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_caller_maps_to_at_most_one_branch() {
        let registry = Registry::new();
        registry.register("10.0.0.1", "feature-x");
        registry.register("10.0.0.1", "feature-y");
        assert_eq!(registry.get_branch("10.0.0.1").as_deref(), Some("feature-y"));
        assert_eq!(registry.list_all().len(), 1);
    }

    #[test]
    fn unregistered_caller_lookup_is_absent_not_default() {
        let registry = Registry::new();
        assert_eq!(registry.get_branch("unknown"), None);
    }

    #[test]
    fn deregister_returns_the_prior_branch_and_clears_it() {
        let registry = Registry::new();
        registry.register("10.0.0.2", "feature-x");
        assert_eq!(registry.deregister("10.0.0.2").as_deref(), Some("feature-x"));
        assert_eq!(registry.get_branch("10.0.0.2"), None);
        assert_eq!(registry.deregister("10.0.0.2"), None);
    }

    #[test]
    fn list_all_is_a_snapshot() {
        let registry = Registry::new();
        registry.register("a", "branch-a");
        registry.register("b", "branch-b");
        let snapshot = registry.list_all();
        assert_eq!(snapshot.get("a").map(String::as_str), Some("branch-a"));
        assert_eq!(snapshot.get("b").map(String::as_str), Some("branch-b"));
    }
}
