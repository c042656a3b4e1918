use std::collections::HashMap;

use crate::error::{LayoutError, Result};

/// Host-assigned integer identifier of a child view.
pub type RegionHandle = i32;

/// Maps host handles to the region names used in constraint text and back.
pub trait RegionResolver: Send + Sync {
    fn name_for_handle(&self, handle: RegionHandle) -> Option<String>;
    fn handle_for_name(&self, name: &str) -> Option<RegionHandle>;

    fn require_name(&self, handle: RegionHandle) -> Result<String> {
        self.name_for_handle(handle)
            .ok_or(LayoutError::UnknownHandle(handle))
    }
}

/// Bidirectional in-memory resolver.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    by_handle: HashMap<RegionHandle, String>,
    by_name: HashMap<String, RegionHandle>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for `handle`, replacing any previous pairing of either side.
    pub fn register(&mut self, handle: RegionHandle, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if let Some(previous) = self.by_handle.insert(handle, name.clone()) {
            self.by_name.remove(&previous);
        }
        if let Some(previous) = self.by_name.insert(name, handle) {
            if previous != handle {
                self.by_handle.remove(&previous);
            }
        }
        self
    }

    pub fn with(mut self, handle: RegionHandle, name: impl Into<String>) -> Self {
        self.register(handle, name);
        self
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}

impl RegionResolver for NameTable {
    fn name_for_handle(&self, handle: RegionHandle) -> Option<String> {
        self.by_handle.get(&handle).cloned()
    }

    fn handle_for_name(&self, name: &str) -> Option<RegionHandle> {
        self.by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_work_both_ways() {
        let table = NameTable::new().with(7, "blue").with(9, "red");
        assert_eq!(table.name_for_handle(7).as_deref(), Some("blue"));
        assert_eq!(table.handle_for_name("red"), Some(9));
        assert_eq!(table.handle_for_name("green"), None);
        assert!(matches!(
            table.require_name(3),
            Err(LayoutError::UnknownHandle(3))
        ));
    }

    #[test]
    fn re_registering_replaces_stale_pairs() {
        let mut table = NameTable::new();
        table.register(1, "blue").register(1, "green").register(2, "green");
        assert_eq!(table.len(), 1);
        assert_eq!(table.handle_for_name("blue"), None);
        assert_eq!(table.name_for_handle(1), None);
        assert_eq!(table.name_for_handle(2).as_deref(), Some("green"));
    }
}
