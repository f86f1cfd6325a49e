use serde::{Deserialize, Serialize};

use crate::common::error::Result;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub username: String,
    pub secret_hash: String,
}

#[trait_variant::make(Directory: Send)]
pub trait UnsendDirectory {
    /// Fails `NotFound` when the identity does not exist.
    async fn lookup(&self, identity: &str) -> Result<DirectoryEntry>;
    /// Replaces the secret hash only if it still equals `old_hash`, else `Conflict`.
    async fn compare_and_swap_secret(&self, identity: &str, old_hash: &str, new_hash: &str) -> Result<()>;
    /// Fails `Conflict` when the identity already exists.
    async fn create_identity(&self, identity: &str, entry: &DirectoryEntry) -> Result<()>;
}
