use serde::Deserialize;
use std::time::Duration;

use crate::common::error::Result;
use crate::common::secret::MIN_SECRET_LENGTH;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    File,
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    pub fleet_store_type: StorageType,
    pub fleet_store_path: String,

    pub directory_type: StorageType,
    pub directory_url: Option<String>,
    pub directory_ca_path: Option<String>,
    pub directory_bind_identity: Option<String>,
    pub directory_bind_secret: Option<String>,
    pub directory_key_prefix: String,

    pub secret_length: usize,
    pub secret_charset: String,

    pub queue_host: String,
    pub queue_port: u16,
    pub queue_wait_for_completion: bool,
    pub queue_completion_timeout_secs: u64,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,

    pub sync_interval_secs: u64,
    pub remove_dangling_jobs: bool,
    pub remote_timeout_secs: u64,
}

pub const DEFAULT_SECRET_CHARSET: &str = concat!(
    "abcdefghijklmnopqrstuvwxyz",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "0123456789^!$%&/()=?{[]}+~#-_.:,;<>|\\"
);

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            fleet_store_type: StorageType::File,
            fleet_store_path: "./data/fleet.json".to_string(),
            directory_type: StorageType::Memory,
            directory_url: None,
            directory_ca_path: None,
            directory_bind_identity: None,
            directory_bind_secret: None,
            directory_key_prefix: "directory:user".to_string(),
            secret_length: 32,
            secret_charset: DEFAULT_SECRET_CHARSET.to_string(),
            queue_host: "127.0.0.1".to_string(),
            queue_port: 4730,
            queue_wait_for_completion: false,
            queue_completion_timeout_secs: 600,
            pacing_min_ms: 50,
            pacing_max_ms: 200,
            sync_interval_secs: 60,
            remove_dangling_jobs: true,
            remote_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn queue_completion_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_completion_timeout_secs)
    }
}

/// Layers the optional config file under `FLEET__*` environment variables.
pub fn load_server_config(path: &str) -> Result<ServerConfig> {
    dotenv::dotenv().ok();
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("FLEET").separator("__"))
        .build()?;
    let server_config: ServerConfig = settings.try_deserialize()?;
    if server_config.secret_length < MIN_SECRET_LENGTH {
        return Err(config::ConfigError::Message(format!(
            "secret_length must be at least {}, got {}",
            MIN_SECRET_LENGTH, server_config.secret_length
        ))
        .into());
    }
    Ok(server_config)
}
