//! Allowed collision matrix.

use std::collections::HashMap;

/// Explicit exceptions to default collision checking
///
/// Pairs are unordered. A pair without an explicit entry falls back to the
/// per-link defaults, and finally to "not allowed".
#[derive(Debug, Clone, Default)]
pub struct AllowedCollisionMatrix {
    entries: HashMap<(String, String), bool>,
    defaults: HashMap<String, bool>,
}

impl AllowedCollisionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Permit contact between `a` and `b`
    pub fn allow(&mut self, a: &str, b: &str) {
        self.entries.insert(Self::key(a, b), true);
    }

    /// Forbid contact between `a` and `b`, overriding any default
    pub fn disallow(&mut self, a: &str, b: &str) {
        self.entries.insert(Self::key(a, b), false);
    }

    /// Default for every pair involving `name` that has no explicit entry
    pub fn set_default(&mut self, name: &str, allowed: bool) {
        self.defaults.insert(name.to_string(), allowed);
    }

    pub fn is_allowed(&self, a: &str, b: &str) -> bool {
        if let Some(allowed) = self.entries.get(&Self::key(a, b)) {
            return *allowed;
        }
        self.defaults.get(a).copied().unwrap_or(false)
            || self.defaults.get(b).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.defaults.is_empty()
    }
}
