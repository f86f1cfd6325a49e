use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::common::error::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BuildRef {
    pub number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct JobInfo {
    #[serde(default)]
    pub builds: Vec<BuildRef>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BuildInfo {
    pub number: u64,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub result: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub name: String,
}

/// Opens authenticated sessions against remote build agents.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn open(
        &self,
        host: &str,
        port: u16,
        username: &str,
        secret: &str,
    ) -> Result<Arc<dyn AgentSession>>;
}

#[async_trait]
pub trait AgentSession: Send + Sync {
    async fn get_version(&self) -> Result<String>;
    async fn job_exists(&self, name: &str) -> Result<bool>;
    async fn get_job_info(&self, name: &str) -> Result<JobInfo>;
    async fn get_build_info(&self, name: &str, number: u64) -> Result<BuildInfo>;
    async fn get_build_console_output(&self, name: &str, number: u64) -> Result<String>;
    async fn get_jobs(&self) -> Result<Vec<JobSummary>>;
    async fn delete_job(&self, name: &str) -> Result<()>;
    async fn update_jobs(&self, definitions: &[Value]) -> Result<()>;
}
