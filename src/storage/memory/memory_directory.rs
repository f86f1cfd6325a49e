use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::common::error::{FleetError, Result};
use crate::common::secret::verify_secret;
use crate::traits::directory::{Directory, DirectoryEntry};

/// Process-local directory for development and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    entries: Mutex<HashMap<String, DirectoryEntry>>,
    offline: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks a plaintext secret the way a bind against the directory would.
    pub fn authenticate(&self, username: &str, secret: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .find(|entry| entry.username == username)
            .is_some_and(|entry| verify_secret(secret, &entry.secret_hash))
    }

    /// While offline every directory call fails `Unreachable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn reachable(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FleetError::Unreachable("directory is offline".to_string()));
        }
        Ok(())
    }

    pub fn current_hash(&self, identity: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(identity).map(|entry| entry.secret_hash.clone())
    }
}

impl Directory for MemoryDirectory {
    async fn lookup(&self, identity: &str) -> Result<DirectoryEntry> {
        self.reachable()?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(identity)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("identity {}", identity)))
    }

    async fn compare_and_swap_secret(&self, identity: &str, old_hash: &str, new_hash: &str) -> Result<()> {
        self.reachable()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get_mut(identity)
            .ok_or_else(|| FleetError::NotFound(format!("identity {}", identity)))?;
        if entry.secret_hash != old_hash {
            return Err(FleetError::Conflict(format!(
                "secret of {} was rotated concurrently",
                identity
            )));
        }
        entry.secret_hash = new_hash.to_string();
        Ok(())
    }

    async fn create_identity(&self, identity: &str, entry: &DirectoryEntry) -> Result<()> {
        self.reachable()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(identity) {
            return Err(FleetError::Conflict(format!("identity {} already exists", identity)));
        }
        entries.insert(identity.to_string(), entry.clone());
        Ok(())
    }
}
