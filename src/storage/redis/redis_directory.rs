use crate::common::error::{FleetError, Result};
use crate::storage::redis::redis_client::RedisClient;
use crate::traits::directory::{Directory, DirectoryEntry};

const USERNAME_FIELD: &str = "uid";
const SECRET_FIELD: &str = "userPassword";

/// Directory entries stored as hashes under `<prefix>:<identity>`.
pub struct RedisDirectory {
    client: RedisClient,
    key_prefix: String,
}

impl RedisDirectory {
    pub fn new(client: RedisClient, key_prefix: String) -> Self {
        Self { client, key_prefix }
    }

    fn entry_key(&self, identity: &str) -> String {
        format!("{}:{}", self.key_prefix, identity)
    }
}

impl Directory for RedisDirectory {
    async fn lookup(&self, identity: &str) -> Result<DirectoryEntry> {
        let mut fields = self.client.hgetall(&self.entry_key(identity)).await?;
        match (fields.remove(USERNAME_FIELD), fields.remove(SECRET_FIELD)) {
            (Some(username), Some(secret_hash)) => Ok(DirectoryEntry {
                username,
                secret_hash,
            }),
            _ => Err(FleetError::NotFound(format!("identity {}", identity))),
        }
    }

    async fn compare_and_swap_secret(&self, identity: &str, old_hash: &str, new_hash: &str) -> Result<()> {
        let outcome = self
            .client
            .compare_and_swap_field(&self.entry_key(identity), SECRET_FIELD, old_hash, new_hash)
            .await?;
        match outcome {
            1 => Ok(()),
            0 => Err(FleetError::Conflict(format!(
                "secret of {} was rotated concurrently",
                identity
            ))),
            _ => Err(FleetError::NotFound(format!("identity {}", identity))),
        }
    }

    async fn create_identity(&self, identity: &str, entry: &DirectoryEntry) -> Result<()> {
        let created = self
            .client
            .create_hash_if_absent(
                &self.entry_key(identity),
                &[
                    (USERNAME_FIELD, entry.username.as_str()),
                    (SECRET_FIELD, entry.secret_hash.as_str()),
                ],
            )
            .await?;
        if !created {
            return Err(FleetError::Conflict(format!("identity {} already exists", identity)));
        }
        log::info!("Created directory identity {}", identity);
        Ok(())
    }
}
