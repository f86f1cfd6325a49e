use anyhow::Result;
use redis::{IntoConnectionInfo, TlsCertificates};
use std::sync::Arc;

use crate::common::config::{ServerConfig, StorageType};
use crate::remote::gearman::GearmanQueue;
use crate::remote::jenkins::JenkinsConnector;
use crate::storage::{
    directory_impl::DirectoryImpl,
    file::file_fleet_store::FileFleetStore,
    fleet_store_impl::FleetStoreImpl,
    memory::memory_directory::MemoryDirectory,
    memory::memory_fleet_store::MemoryFleetStore,
    redis::redis_client::RedisClient,
    redis::redis_directory::RedisDirectory,
};
use crate::traits::agent::AgentConnector;
use crate::traits::job_queue::JobQueue;

pub async fn load_fleet_store(server_config: &ServerConfig) -> Result<FleetStoreImpl> {
    let store = match &server_config.fleet_store_type {
        StorageType::File => {
            log::debug!("Using file fleet store at {}", server_config.fleet_store_path);
            FleetStoreImpl::File(FileFleetStore::new(&server_config.fleet_store_path))
        }
        StorageType::Memory => {
            log::warn!("Using in-memory fleet store, nothing survives a restart");
            FleetStoreImpl::Memory(MemoryFleetStore::new())
        }
        StorageType::Redis => {
            return Err(anyhow::anyhow!("Unsupported fleet store backend"));
        }
    };
    Ok(store)
}

pub async fn load_directory(server_config: &ServerConfig) -> Result<DirectoryImpl> {
    let directory = match &server_config.directory_type {
        StorageType::Redis => {
            let url = server_config
                .directory_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Directory URL not configured"))?;
            if !url.starts_with("rediss://") {
                return Err(anyhow::anyhow!("Directory must be reached over TLS (rediss://)"));
            }
            let mut info = url.as_str().into_connection_info()?;
            if let Some(identity) = &server_config.directory_bind_identity {
                info.redis.username = Some(identity.clone());
            }
            if let Some(secret) = &server_config.directory_bind_secret {
                info.redis.password = Some(secret.clone());
            }
            let root_cert = match &server_config.directory_ca_path {
                Some(path) => Some(std::fs::read(path)?),
                None => None,
            };
            log::debug!("Using Redis directory at {}", info.addr);
            let client = redis::Client::build_with_tls(
                info,
                TlsCertificates {
                    client_tls: None,
                    root_cert,
                },
            )?;
            let conn = client.get_multiplexed_async_connection().await?;
            DirectoryImpl::Redis(RedisDirectory::new(
                RedisClient::new(conn),
                server_config.directory_key_prefix.clone(),
            ))
        }
        StorageType::Memory => {
            log::warn!("Using in-memory directory, identities are lost on restart");
            DirectoryImpl::Memory(MemoryDirectory::new())
        }
        StorageType::File => {
            return Err(anyhow::anyhow!("Unsupported directory backend"));
        }
    };
    Ok(directory)
}

pub fn load_agent_connector(server_config: &ServerConfig) -> Result<Arc<dyn AgentConnector>> {
    let connector = JenkinsConnector::new(server_config.remote_timeout())?;
    Ok(Arc::new(connector))
}

pub fn load_job_queue(server_config: &ServerConfig) -> Arc<dyn JobQueue> {
    Arc::new(GearmanQueue::new(
        &server_config.queue_host,
        server_config.queue_port,
        server_config.remote_timeout(),
        server_config.queue_completion_timeout(),
    ))
}
