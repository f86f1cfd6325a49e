use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::common::config::ServerConfig;
use crate::common::error::Result;
use crate::common::job::JobQueueTask;
use crate::common::project::ANY_LABEL;
use crate::common::utils::pacing_delay;
use crate::traits::job_queue::JobQueue;

pub struct JobDispatcher {
    queue: Arc<dyn JobQueue>,
    pacing_min_ms: u64,
    pacing_max_ms: u64,
    wait_for_completion: bool,
}

impl JobDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, config: &ServerConfig) -> Self {
        Self {
            queue,
            pacing_min_ms: config.pacing_min_ms,
            pacing_max_ms: config.pacing_max_ms,
            wait_for_completion: config.queue_wait_for_completion,
        }
    }

    /// One unlabelled task for no labels or just `any`, else one task per label.
    pub fn build_tasks(
        project: &str,
        labels: &[String],
        overrides: Option<&BTreeMap<String, String>>,
    ) -> Vec<JobQueueTask> {
        let untargeted = labels.is_empty() || (labels.len() == 1 && labels[0] == ANY_LABEL);
        if untargeted {
            return vec![JobQueueTask::build(project, None, overrides)];
        }
        labels
            .iter()
            .map(|label| JobQueueTask::build(project, Some(label), overrides))
            .collect()
    }

    /// Returns the unique ids of the submitted jobs.
    pub async fn submit_build(
        &self,
        project: &str,
        labels: &[String],
        overrides: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<String>> {
        self.queue.wait_for_server().await?;
        let tasks = Self::build_tasks(project, labels, overrides);
        let mut ids = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(pacing_delay(self.pacing_min_ms, self.pacing_max_ms)).await;
            }
            let handle = self.queue.submit_job(task, self.wait_for_completion).await?;
            log::info!("Submitted {} as {} ({})", task.name, handle, task.unique_id);
            ids.push(task.unique_id.clone());
        }
        Ok(ids)
    }

    /// Fire-and-forget: nothing confirms the build was actually stopped.
    pub async fn submit_abort(&self, project: &str) -> Result<()> {
        self.queue.wait_for_server().await?;
        let task = JobQueueTask::stop(self.queue.host(), project);
        let handle = self.queue.submit_job(&task, false).await?;
        log::info!("Requested abort of {} via {} ({})", project, task.name, handle);
        Ok(())
    }

    pub async fn worker_hosts(&self) -> Result<Vec<Ipv4Addr>> {
        let lines = self.queue.workers().await?;
        Ok(parse_worker_hosts(&lines))
    }
}

/// Worker addresses from a `workers` admin response. A line of the form
/// `<fd> <ip> - : ...` is a client connection and cancels one occurrence
/// of its address.
pub fn parse_worker_hosts(lines: &[String]) -> Vec<Ipv4Addr> {
    let mut seen: Vec<Ipv4Addr> = Vec::new();
    let mut clients: Vec<Ipv4Addr> = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        for (i, field) in fields.iter().enumerate() {
            let Ok(ip) = field.parse::<Ipv4Addr>() else {
                continue;
            };
            seen.push(ip);
            if fields.get(i + 1) == Some(&"-") {
                clients.push(ip);
            }
        }
    }
    for client in clients {
        if let Some(pos) = seen.iter().position(|ip| *ip == client) {
            seen.remove(pos);
        }
    }
    let mut distinct = HashSet::new();
    seen.retain(|ip| distinct.insert(*ip));
    seen
}
