//! Bidirectional mapping between logical screen ids and backend screen ids.
//!
//! The service issues its own stable [`ScreenId`]s to clients.  The rendering
//! backend has an unrelated id space ([`BackendScreenId`]).  Every logical id
//! maps to at most one backend id and vice versa; removing either side removes
//! both directions in one step.
//!
//! Screen groups draw their ids from the same logical counter, which is why
//! [`ScreenIdentityMap::allocate_logical`] exists separately from
//! [`ScreenIdentityMap::get_or_allocate`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical screen (and display) id issued by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScreenId(pub u64);

impl ScreenId {
    pub const INVALID: ScreenId = ScreenId(u64::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// Opaque screen id owned by the rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackendScreenId(pub u64);

impl fmt::Display for BackendScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rs#{}", self.0)
    }
}

/// The logical ↔ backend id bijection plus the logical id counter.
#[derive(Debug, Default)]
pub struct ScreenIdentityMap {
    logical_to_backend: HashMap<ScreenId, BackendScreenId>,
    backend_to_logical: HashMap<BackendScreenId, ScreenId>,
    next_logical: u64,
}

impl ScreenIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh logical id without binding it to a backend id.
    pub fn allocate_logical(&mut self) -> ScreenId {
        let id = ScreenId(self.next_logical);
        self.next_logical += 1;
        id
    }

    /// Returns the logical id bound to `backend`, allocating and binding a new
    /// one on first sight.  The `bool` is `true` when a new id was allocated.
    pub fn get_or_allocate(&mut self, backend: BackendScreenId) -> (ScreenId, bool) {
        if let Some(&logical) = self.backend_to_logical.get(&backend) {
            return (logical, false);
        }
        let logical = self.allocate_logical();
        self.logical_to_backend.insert(logical, backend);
        self.backend_to_logical.insert(backend, logical);
        (logical, true)
    }

    /// Binds an explicit pair.  Refuses (returns `false`) if either side is
    /// already bound, which would break the bijection.
    pub fn insert(&mut self, logical: ScreenId, backend: BackendScreenId) -> bool {
        if self.logical_to_backend.contains_key(&logical)
            || self.backend_to_logical.contains_key(&backend)
        {
            return false;
        }
        self.logical_to_backend.insert(logical, backend);
        self.backend_to_logical.insert(backend, logical);
        true
    }

    pub fn to_backend(&self, logical: ScreenId) -> Option<BackendScreenId> {
        self.logical_to_backend.get(&logical).copied()
    }

    pub fn to_logical(&self, backend: BackendScreenId) -> Option<ScreenId> {
        self.backend_to_logical.get(&backend).copied()
    }

    /// Removes the pair containing `logical`.
    pub fn remove_logical(&mut self, logical: ScreenId) -> Option<BackendScreenId> {
        let backend = self.logical_to_backend.remove(&logical)?;
        self.backend_to_logical.remove(&backend);
        Some(backend)
    }

    /// Removes the pair containing `backend`.
    pub fn remove_backend(&mut self, backend: BackendScreenId) -> Option<ScreenId> {
        let logical = self.backend_to_logical.remove(&backend)?;
        self.logical_to_backend.remove(&logical);
        Some(logical)
    }

    pub fn len(&self) -> usize {
        self.logical_to_backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logical_to_backend.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_allocate_is_idempotent() {
        // Arrange
        let mut map = ScreenIdentityMap::new();

        // Act
        let (first, created_first) = map.get_or_allocate(BackendScreenId(77));
        let (second, created_second) = map.get_or_allocate(BackendScreenId(77));

        // Assert
        assert_eq!(first, second);
        assert!(created_first);
        assert!(!created_second);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_translation_is_a_bijection() {
        let mut map = ScreenIdentityMap::new();
        let backends = [BackendScreenId(5), BackendScreenId(9), BackendScreenId(1)];
        for b in backends {
            map.get_or_allocate(b);
        }

        for b in backends {
            let logical = map.to_logical(b).unwrap();
            assert_eq!(map.to_backend(logical), Some(b));
        }
    }

    #[test]
    fn test_remove_logical_clears_both_directions() {
        let mut map = ScreenIdentityMap::new();
        let (logical, _) = map.get_or_allocate(BackendScreenId(3));

        assert_eq!(map.remove_logical(logical), Some(BackendScreenId(3)));

        assert_eq!(map.to_backend(logical), None);
        assert_eq!(map.to_logical(BackendScreenId(3)), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_remove_backend_clears_both_directions() {
        let mut map = ScreenIdentityMap::new();
        let (logical, _) = map.get_or_allocate(BackendScreenId(3));

        assert_eq!(map.remove_backend(BackendScreenId(3)), Some(logical));

        assert_eq!(map.to_backend(logical), None);
    }

    #[test]
    fn test_insert_refuses_to_rebind_either_side() {
        let mut map = ScreenIdentityMap::new();
        assert!(map.insert(ScreenId(10), BackendScreenId(100)));
        assert!(!map.insert(ScreenId(10), BackendScreenId(101)));
        assert!(!map.insert(ScreenId(11), BackendScreenId(100)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_logical_ids_are_never_reused() {
        let mut map = ScreenIdentityMap::new();
        let (a, _) = map.get_or_allocate(BackendScreenId(1));
        map.remove_logical(a);
        let (b, _) = map.get_or_allocate(BackendScreenId(1));
        assert_ne!(a, b);
    }
}
