use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::common::error::Result;
use crate::common::secret::{hash_secret, verify_secret, SecretPolicy};
use crate::common::utils::with_timeout;
use crate::storage::directory_impl::DirectoryImpl;
use crate::traits::directory::{Directory, DirectoryEntry};

/// A freshly issued secret. Only valid until the identity is rotated again.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub secret: String,
    pub hash: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("hash", &self.hash)
            .finish()
    }
}

/// Mints single-use secrets by rotating the directory entry of an identity.
pub struct CredentialBroker {
    directory: Arc<DirectoryImpl>,
    policy: SecretPolicy,
    timeout: Duration,
}

impl CredentialBroker {
    pub fn new(directory: Arc<DirectoryImpl>, policy: SecretPolicy, timeout: Duration) -> Self {
        Self {
            directory,
            policy,
            timeout,
        }
    }

    pub fn directory(&self) -> &Arc<DirectoryImpl> {
        &self.directory
    }

    /// Replaces the current secret of `identity` with a fresh one and returns it.
    pub async fn fetch(&self, identity: &str) -> Result<Credential> {
        let entry = with_timeout(self.timeout, "directory lookup", self.directory.lookup(identity)).await?;
        let secret = self.policy.generate();
        let hash = hash_secret(&secret);
        with_timeout(
            self.timeout,
            "directory update",
            self.directory
                .compare_and_swap_secret(identity, &entry.secret_hash, &hash),
        )
        .await?;
        log::debug!("Issued fresh secret for {}", identity);
        Ok(Credential {
            username: entry.username,
            secret,
            hash,
        })
    }

    /// Burns the secret whose hash is `expected_old_hash`, used or not.
    pub async fn invalidate(&self, identity: &str, expected_old_hash: &str) -> Result<()> {
        let hash = hash_secret(&self.policy.generate());
        with_timeout(
            self.timeout,
            "directory update",
            self.directory
                .compare_and_swap_secret(identity, expected_old_hash, &hash),
        )
        .await?;
        log::debug!("Invalidated secret for {}", identity);
        Ok(())
    }

    /// Creates `identity` with a secret nobody ever sees.
    pub async fn provision(&self, identity: &str) -> Result<()> {
        let entry = DirectoryEntry {
            username: identity.to_string(),
            secret_hash: hash_secret(&self.policy.generate()),
        };
        with_timeout(
            self.timeout,
            "directory create",
            self.directory.create_identity(identity, &entry),
        )
        .await?;
        log::info!("Provisioned directory identity {}", identity);
        Ok(())
    }

    pub fn verify(secret: &str, hash: &str) -> bool {
        verify_secret(secret, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::FleetError;
    use crate::storage::memory::memory_directory::MemoryDirectory;

    fn broker() -> CredentialBroker {
        CredentialBroker::new(
            Arc::new(DirectoryImpl::Memory(MemoryDirectory::new())),
            SecretPolicy::default(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn debug_hides_secret() {
        let credential = Credential {
            username: "acme_jenkins".to_string(),
            secret: "hunter2".to_string(),
            hash: "{SSHA256}x".to_string(),
        };
        let shown = format!("{:?}", credential);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("acme_jenkins"));
    }

    #[tokio::test]
    async fn fetch_unknown_identity_is_not_found() {
        let err = broker().fetch("ghost_jenkins").await.unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn provision_twice_conflicts() {
        let broker = broker();
        broker.provision("acme_jenkins").await.unwrap();
        let err = broker.provision("acme_jenkins").await.unwrap_err();
        assert!(matches!(err, FleetError::Conflict(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn fetched_secret_matches_stored_hash() {
        let broker = broker();
        broker.provision("acme_jenkins").await.unwrap();
        let credential = broker.fetch("acme_jenkins").await.unwrap();
        assert_eq!(credential.username, "acme_jenkins");
        assert!(CredentialBroker::verify(&credential.secret, &credential.hash));
        let stored = broker.directory().lookup("acme_jenkins").await.unwrap();
        assert_eq!(stored.secret_hash, credential.hash);
    }
}
