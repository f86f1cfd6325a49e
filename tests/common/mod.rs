#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ciaas_fleet::common::config::{ServerConfig, StorageType};
use ciaas_fleet::common::error::{FleetError, Result};
use ciaas_fleet::common::job::JobQueueTask;
use ciaas_fleet::common::partner::{FleetNode, Node, Partner};
use ciaas_fleet::fleet::sync::ManualClock;
use ciaas_fleet::server::context::FleetContext;
use ciaas_fleet::storage::directory_impl::DirectoryImpl;
use ciaas_fleet::storage::fleet_store_impl::FleetStoreImpl;
use ciaas_fleet::storage::memory::memory_directory::MemoryDirectory;
use ciaas_fleet::storage::memory::memory_fleet_store::MemoryFleetStore;
use ciaas_fleet::traits::agent::{
    AgentConnector, AgentSession, BuildInfo, BuildRef, JobInfo, JobSummary,
};
use ciaas_fleet::traits::job_queue::JobQueue;

#[derive(Debug, Clone)]
pub struct FakeBuild {
    pub number: u64,
    pub timestamp_ms: i64,
    pub result: Option<String>,
    pub console: String,
}

pub fn build(number: u64, timestamp_ms: i64) -> FakeBuild {
    FakeBuild {
        number,
        timestamp_ms,
        result: Some("SUCCESS".to_string()),
        console: format!("console of #{}", number),
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    pub online: bool,
    /// Job calls fail although the version probe succeeds.
    pub broken: bool,
    pub fail_metadata: bool,
    /// Job calls never answer although the version probe succeeds.
    pub hang: bool,
    pub jobs: BTreeMap<String, Vec<FakeBuild>>,
}

#[derive(Default)]
struct FakeState {
    nodes: HashMap<String, FakeNode>,
    deleted: Vec<(String, String)>,
    pushed: Vec<(String, Value)>,
}

/// Remote agents keyed by `host:port`, shared by every session.
#[derive(Clone, Default)]
pub struct FakeAgents {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAgents {
    pub fn add_node(&self, address: &str) {
        self.state.lock().unwrap().nodes.insert(
            address.to_string(),
            FakeNode {
                online: true,
                ..FakeNode::default()
            },
        );
    }

    pub fn update(&self, address: &str, f: impl FnOnce(&mut FakeNode)) {
        let mut state = self.state.lock().unwrap();
        f(state.nodes.get_mut(address).unwrap());
    }

    pub fn add_job(&self, address: &str, name: &str, builds: Vec<FakeBuild>) {
        self.update(address, |node| {
            node.jobs.insert(name.to_string(), builds);
        });
    }

    pub fn jobs(&self, address: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.nodes[address].jobs.keys().cloned().collect()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// (address, job name) of every pushed definition, in push order.
    pub fn pushed(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .pushed
            .iter()
            .map(|(address, definition)| {
                (
                    address.clone(),
                    definition["job"]["name"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    fn node(&self, address: &str) -> Option<FakeNode> {
        self.state.lock().unwrap().nodes.get(address).cloned()
    }
}

pub struct FakeConnector {
    pub agents: FakeAgents,
    pub directory: Arc<DirectoryImpl>,
}

#[async_trait]
impl AgentConnector for FakeConnector {
    async fn open(
        &self,
        host: &str,
        port: u16,
        username: &str,
        secret: &str,
    ) -> Result<Arc<dyn AgentSession>> {
        let address = format!("{}:{}", host, port);
        match self.agents.node(&address) {
            Some(node) if node.online => Ok(Arc::new(FakeSession {
                address,
                username: username.to_string(),
                secret: secret.to_string(),
                agents: self.agents.clone(),
                directory: self.directory.clone(),
            })),
            _ => Err(FleetError::Unreachable(format!("no agent at {}", address))),
        }
    }
}

/// Checks its credential against the directory on every call, like an
/// agent authenticating each request.
pub struct FakeSession {
    address: String,
    username: String,
    secret: String,
    agents: FakeAgents,
    directory: Arc<DirectoryImpl>,
}

impl FakeSession {
    fn authorized(&self) -> Result<FakeNode> {
        let accepted = match self.directory.as_ref() {
            DirectoryImpl::Memory(directory) => directory.authenticate(&self.username, &self.secret),
            _ => false,
        };
        if !accepted {
            return Err(FleetError::Unreachable(format!("401 from {}", self.address)));
        }
        match self.agents.node(&self.address) {
            Some(node) if node.online => Ok(node),
            _ => Err(FleetError::Unreachable(format!("{} went away", self.address))),
        }
    }

    fn healthy(&self) -> Result<FakeNode> {
        let node = self.authorized()?;
        if node.broken {
            return Err(FleetError::Unreachable(format!("500 from {}", self.address)));
        }
        Ok(node)
    }

    async fn stall(&self) {
        if self.agents.node(&self.address).is_some_and(|node| node.hang) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }

    fn job(&self, name: &str) -> Result<Vec<FakeBuild>> {
        self.healthy()?
            .jobs
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("job {}", name)))
    }

    fn find(&self, name: &str, number: u64) -> Result<FakeBuild> {
        self.job(name)?
            .into_iter()
            .find(|b| b.number == number)
            .ok_or_else(|| FleetError::NotFound(format!("{} #{}", name, number)))
    }
}

#[async_trait]
impl AgentSession for FakeSession {
    async fn get_version(&self) -> Result<String> {
        self.authorized()?;
        Ok("2.60.3".to_string())
    }

    async fn job_exists(&self, name: &str) -> Result<bool> {
        self.stall().await;
        match self.job(name) {
            Ok(_) => Ok(true),
            Err(FleetError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_job_info(&self, name: &str) -> Result<JobInfo> {
        self.stall().await;
        let builds = self.job(name)?;
        Ok(JobInfo {
            builds: builds.iter().map(|b| BuildRef { number: b.number }).collect(),
        })
    }

    async fn get_build_info(&self, name: &str, number: u64) -> Result<BuildInfo> {
        if self.authorized()?.fail_metadata {
            return Err(FleetError::Unreachable("metadata unavailable".to_string()));
        }
        let build = self.find(name, number)?;
        Ok(BuildInfo {
            number,
            timestamp: build.timestamp_ms,
            result: build.result,
        })
    }

    async fn get_build_console_output(&self, name: &str, number: u64) -> Result<String> {
        Ok(self.find(name, number)?.console)
    }

    async fn get_jobs(&self) -> Result<Vec<JobSummary>> {
        self.stall().await;
        let node = self.healthy()?;
        Ok(node
            .jobs
            .keys()
            .map(|name| JobSummary { name: name.clone() })
            .collect())
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        self.stall().await;
        self.job(name)?;
        let mut state = self.agents.state.lock().unwrap();
        if let Some(node) = state.nodes.get_mut(&self.address) {
            node.jobs.remove(name);
        }
        state.deleted.push((self.address.clone(), name.to_string()));
        Ok(())
    }

    async fn update_jobs(&self, definitions: &[Value]) -> Result<()> {
        self.stall().await;
        self.healthy()?;
        let mut state = self.agents.state.lock().unwrap();
        for definition in definitions {
            if let Some(name) = definition["job"]["name"].as_str() {
                if let Some(node) = state.nodes.get_mut(&self.address) {
                    node.jobs.entry(name.to_string()).or_default();
                }
            }
            state.pushed.push((self.address.clone(), definition.clone()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeQueue {
    pub submitted: Mutex<Vec<JobQueueTask>>,
    pub down: AtomicBool,
    pub worker_lines: Mutex<Vec<String>>,
}

impl FakeQueue {
    pub fn submitted(&self) -> Vec<JobQueueTask> {
        self.submitted.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(FleetError::Unreachable("queue down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for FakeQueue {
    fn host(&self) -> &str {
        "gearman.test"
    }

    async fn wait_for_server(&self) -> Result<()> {
        self.check()
    }

    async fn submit_job(&self, task: &JobQueueTask, _wait_for_completion: bool) -> Result<String> {
        self.check()?;
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(task.clone());
        Ok(format!("H:gearman.test:{}", submitted.len()))
    }

    async fn workers(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.worker_lines.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub ctx: FleetContext,
    pub agents: FakeAgents,
    pub queue: Arc<FakeQueue>,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<DirectoryImpl>,
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        fleet_store_type: StorageType::Memory,
        directory_type: StorageType::Memory,
        pacing_min_ms: 0,
        pacing_max_ms: 0,
        remote_timeout_secs: 2,
        ..ServerConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: ServerConfig) -> Harness {
    let agents = FakeAgents::default();
    let queue = Arc::new(FakeQueue::default());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let directory = Arc::new(DirectoryImpl::Memory(MemoryDirectory::new()));
    let connector = Arc::new(FakeConnector {
        agents: agents.clone(),
        directory: directory.clone(),
    });
    let ctx = FleetContext::new(
        config,
        FleetStoreImpl::Memory(MemoryFleetStore::new()),
        directory.clone(),
        connector,
        queue.clone(),
        clock.clone(),
    );
    Harness {
        ctx,
        agents,
        queue,
        clock,
        directory,
    }
}

pub fn address(node: &Node) -> String {
    format!("{}:{}", node.host, node.port)
}

impl Harness {
    /// Provisions a partner whose nodes are registered and reachable.
    pub async fn partner(&self, short_name: &str, node_amount: usize) -> (Partner, Vec<FleetNode>) {
        let (partner, nodes) = self
            .ctx
            .registry
            .provision_partner(short_name, &format!("{} Inc.", short_name), node_amount)
            .await
            .unwrap();
        let mut registered = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let host = format!("10.{}.0.{}", partner.id, i + 1);
            let node = self
                .ctx
                .registry
                .register_node(&node.token, &host, 8080)
                .await
                .unwrap();
            self.agents.add_node(&address(&node));
            registered.push(FleetNode {
                node,
                partner: partner.clone(),
            });
        }
        (partner, registered)
    }

    pub fn memory_directory(&self) -> &MemoryDirectory {
        match self.directory.as_ref() {
            DirectoryImpl::Memory(directory) => directory,
            _ => unreachable!("harness always uses the memory directory"),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }
}
