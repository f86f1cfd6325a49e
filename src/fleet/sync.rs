use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::common::error::{FleetError, Result};
use crate::common::utils::with_timeout;
use crate::fleet::fleet_directory::FleetDirectory;
use crate::storage::fleet_store_impl::FleetStoreImpl;
use crate::traits::agent::AgentSession;
use crate::traits::fleet_store::FleetStore;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Default)]
struct SyncState {
    pending: BTreeSet<String>,
    last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    pub projects: Vec<String>,
    pub nodes: usize,
    pub failed_nodes: usize,
    pub pushed: usize,
    pub removed: usize,
}

/// Batches project changes and pushes them to the fleet at most once per interval.
pub struct SyncController {
    state: Mutex<SyncState>,
    interval: Duration,
    remove_dangling: bool,
    fleet: Arc<FleetDirectory>,
    store: Arc<FleetStoreImpl>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl SyncController {
    pub fn new(
        fleet: Arc<FleetDirectory>,
        store: Arc<FleetStoreImpl>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        remove_dangling: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(SyncState::default()),
            interval,
            remove_dangling,
            fleet,
            store,
            clock,
            timeout,
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pending(&self) -> BTreeSet<String> {
        self.state().pending.clone()
    }

    /// Queues `project` and, once the interval has passed since the last
    /// pass, drains the queue into a background pass.
    pub fn sync(&self, project: Option<&str>) -> Option<JoinHandle<SyncReport>> {
        let snapshot = {
            let mut state = self.state();
            if let Some(project) = project {
                state.pending.insert(project.to_string());
            }
            let now = self.clock.now();
            if let Some(last) = state.last_sync {
                let interval = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::MAX);
                if now - last <= interval {
                    log::debug!("Sync deferred, {} project(s) pending", state.pending.len());
                    return None;
                }
            }
            state.last_sync = Some(now);
            std::mem::take(&mut state.pending)
        };

        log::info!("Starting sync pass over {} project(s)", snapshot.len());
        let pass = SyncPass {
            fleet: self.fleet.clone(),
            store: self.store.clone(),
            remove_dangling: self.remove_dangling,
            timeout: self.timeout,
        };
        Some(tokio::spawn(async move { pass.run(snapshot).await }))
    }
}

struct SyncPass {
    fleet: Arc<FleetDirectory>,
    store: Arc<FleetStoreImpl>,
    remove_dangling: bool,
    timeout: Duration,
}

#[derive(Default)]
struct NodeSync {
    pushed: usize,
    removed: usize,
    errors: usize,
}

impl SyncPass {
    async fn run(self, pending: BTreeSet<String>) -> SyncReport {
        let mut report = SyncReport {
            projects: pending.iter().cloned().collect(),
            ..SyncReport::default()
        };

        let projects = match self.store.get_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                log::error!("Sync pass aborted, cannot read projects: {}", e);
                return report;
            }
        };
        let known: HashSet<String> = projects.iter().map(|p| p.name.clone()).collect();
        let definitions: Vec<(String, Value)> = projects
            .iter()
            .filter(|p| pending.contains(&p.name))
            .map(|p| (p.name.clone(), p.job_definition()))
            .collect();

        let nodes = match self.fleet.get_online_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                log::error!("Sync pass aborted, cannot list nodes: {}", e);
                return report;
            }
        };
        report.nodes = nodes.len();

        let pass = &self;
        let known = &known;
        let definitions = &definitions;
        for node in &nodes {
            let outcome = self
                .fleet
                .connection()
                .with_session(node, |session| async move {
                    Ok::<_, FleetError>(pass.sync_node(session, known, definitions).await)
                })
                .await;
            match outcome {
                Ok(node_sync) => {
                    report.pushed += node_sync.pushed;
                    report.removed += node_sync.removed;
                    if node_sync.errors > 0 {
                        report.failed_nodes += 1;
                    }
                }
                Err(e) => {
                    report.failed_nodes += 1;
                    log::warn!("Sync of node {} failed: {}", node.id(), e);
                }
            }
        }

        log::info!(
            "Sync pass done: {} node(s), {} failed, {} definition(s) pushed, {} job(s) removed",
            report.nodes,
            report.failed_nodes,
            report.pushed,
            report.removed
        );
        report
    }

    async fn sync_node(
        &self,
        session: Arc<dyn AgentSession>,
        known: &HashSet<String>,
        definitions: &[(String, Value)],
    ) -> NodeSync {
        let mut outcome = NodeSync::default();

        if self.remove_dangling {
            match self.remove_dangling_jobs(&session, known).await {
                Ok(removed) => outcome.removed = removed,
                Err(e) => {
                    outcome.errors += 1;
                    log::warn!("Could not list jobs for dangling cleanup: {}", e);
                }
            }
        }

        for (name, definition) in definitions {
            let pushed = with_timeout(
                self.timeout,
                "job push",
                session.update_jobs(std::slice::from_ref(definition)),
            )
            .await;
            match pushed {
                Ok(()) => outcome.pushed += 1,
                Err(e) => {
                    outcome.errors += 1;
                    log::warn!("Could not push job {}: {}", name, e);
                }
            }
        }
        outcome
    }

    async fn remove_dangling_jobs(
        &self,
        session: &Arc<dyn AgentSession>,
        known: &HashSet<String>,
    ) -> Result<usize> {
        let jobs = with_timeout(self.timeout, "job listing", session.get_jobs()).await?;
        let mut removed = 0;
        for job in jobs.iter().filter(|job| !known.contains(&job.name)) {
            match with_timeout(self.timeout, "job delete", session.delete_job(&job.name)).await {
                Ok(()) => {
                    removed += 1;
                    log::info!("Removed dangling job {}", job.name);
                }
                Err(e) => log::warn!("Could not remove dangling job {}: {}", job.name, e),
            }
        }
        Ok(removed)
    }
}
