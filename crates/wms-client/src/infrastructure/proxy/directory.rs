//! An in-process [`ServiceDirectory`].
//!
//! Services are published under well-known names.  Withdrawing a name does
//! not touch adapters that already hold the object; they keep it until its
//! peer dies or they are invalidated.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{RemoteObject, ServiceDirectory};

/// Name the display manager is published under.
pub const DISPLAY_MANAGER_SERVICE: &str = "display_manager";
/// Name the scene session manager is published under.
pub const SCENE_SESSION_SERVICE: &str = "scene_session_manager";

#[derive(Debug, Default)]
pub struct LocalServiceDirectory {
    services: RwLock<HashMap<String, RemoteObject>>,
}

impl LocalServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `object` under `name`, replacing any earlier entry.
    pub fn publish(&self, name: impl Into<String>, object: RemoteObject) {
        let name = name.into();
        debug!("service {name} published (proxy: {})", object.is_proxy());
        self.services.write().insert(name, object);
    }

    /// Returns `true` if `name` was published.
    pub fn withdraw(&self, name: &str) -> bool {
        self.services.write().remove(name).is_some()
    }
}

impl ServiceDirectory for LocalServiceDirectory {
    fn get_service(&self, name: &str) -> Option<RemoteObject> {
        self.services.read().get(name).cloned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_publish_then_withdraw() {
        // Arrange
        let directory = LocalServiceDirectory::new();
        let value: Arc<u32> = Arc::new(7);

        // Act
        directory.publish("seven", RemoteObject::local(value));

        // Assert
        assert!(directory.get_service("seven").is_some());
        assert!(directory.withdraw("seven"));
        assert!(directory.get_service("seven").is_none());
        assert!(!directory.withdraw("seven"));
    }
}
