use crate::common::error::Result;
use crate::storage::memory::memory_directory::MemoryDirectory;
use crate::storage::redis::redis_directory::RedisDirectory;
use crate::traits::directory::{Directory, DirectoryEntry};

pub enum DirectoryImpl {
    Redis(RedisDirectory),
    Memory(MemoryDirectory),
}

impl Directory for DirectoryImpl {
    async fn lookup(&self, identity: &str) -> Result<DirectoryEntry> {
        match self {
            DirectoryImpl::Redis(r) => r.lookup(identity).await,
            DirectoryImpl::Memory(m) => m.lookup(identity).await,
        }
    }

    async fn compare_and_swap_secret(&self, identity: &str, old_hash: &str, new_hash: &str) -> Result<()> {
        match self {
            DirectoryImpl::Redis(r) => r.compare_and_swap_secret(identity, old_hash, new_hash).await,
            DirectoryImpl::Memory(m) => m.compare_and_swap_secret(identity, old_hash, new_hash).await,
        }
    }

    async fn create_identity(&self, identity: &str, entry: &DirectoryEntry) -> Result<()> {
        match self {
            DirectoryImpl::Redis(r) => r.create_identity(identity, entry).await,
            DirectoryImpl::Memory(m) => m.create_identity(identity, entry).await,
        }
    }
}
