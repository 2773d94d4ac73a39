//! Process-wide cache of verified tool handles.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{ToolHandle, ToolKind};

/// Holds at most one verified handle per tool.
///
/// Writes are "set if absent" unless forced, so concurrent resolutions of
/// the same tool settle on whichever handle landed first.
#[derive(Debug)]
pub struct ToolCache {
    entries: RwLock<HashMap<ToolKind, ToolHandle>>,
    enabled: bool,
}

impl ToolCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            enabled: true,
        }
    }

    /// Creates a cache that never stores anything, so every resolution
    /// re-verifies.
    pub fn disabled() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            enabled: false,
        }
    }

    /// Returns the cached handle for a tool.
    pub fn get(&self, kind: ToolKind) -> Option<ToolHandle> {
        if !self.enabled {
            return None;
        }
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&kind).cloned()
    }

    /// Stores a handle and returns the one now in effect.
    ///
    /// Without `force`, an existing entry is kept and returned instead.
    pub fn insert(&self, handle: ToolHandle, force: bool) -> ToolHandle {
        if !self.enabled {
            return handle;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if force {
            entries.insert(handle.kind, handle.clone());
            return handle;
        }
        entries.entry(handle.kind).or_insert(handle).clone()
    }

    /// Drops the cached handle for a tool.
    pub fn invalidate(&self, kind: ToolKind) -> Option<ToolHandle> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&kind)
    }
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new()
    }
}
