use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::build::{epoch_millis_to_utc, sort_newest_first, BuildRecord, BuildResult};
use crate::common::error::{FleetError, Result};
use crate::common::utils::with_timeout;
use crate::fleet::fleet_directory::FleetDirectory;
use crate::traits::agent::AgentSession;

#[derive(Default)]
struct PartialBuild {
    timestamp: Option<DateTime<Utc>>,
    result: Option<BuildResult>,
    console_output: Option<String>,
}

impl PartialBuild {
    fn into_record(self, node_index: usize, number: u64) -> BuildRecord {
        BuildRecord {
            number,
            name: format!("jenkins{}build{}", node_index, number),
            timestamp: self.timestamp,
            result: self.result.unwrap_or(BuildResult::Unknown),
            console_output: self.console_output,
        }
    }
}

/// Merges the build history of one project across every online node.
pub struct BuildAggregator {
    fleet: Arc<FleetDirectory>,
    timeout: Duration,
}

impl BuildAggregator {
    pub fn new(fleet: Arc<FleetDirectory>, timeout: Duration) -> Self {
        Self { fleet, timeout }
    }

    /// Newest first. Nodes that fail contribute nothing instead of failing the call.
    pub async fn collect(&self, project: &str) -> Result<Vec<BuildRecord>> {
        let nodes = self.fleet.get_online_nodes().await?;
        let connection = self.fleet.connection();
        let timeout = self.timeout;

        let mut records = Vec::new();
        let mut failed = 0;
        for (index, node) in nodes.iter().enumerate() {
            let outcome = connection
                .with_session(node, |session| async move {
                    collect_from_node(session, project, index, timeout).await
                })
                .await;
            match outcome {
                Ok(node_records) => records.extend(node_records),
                Err(e) => {
                    failed += 1;
                    log::warn!("No builds of {} from node {}: {}", project, node.id(), e);
                }
            }
        }

        sort_newest_first(&mut records);
        if failed > 0 {
            let partial = FleetError::PartialFailure {
                failed,
                total: nodes.len(),
            };
            log::warn!("Build history of {} is incomplete: {}", project, partial);
        }
        log::info!(
            "Collected {} build(s) of {} from {} node(s)",
            records.len(),
            project,
            nodes.len() - failed
        );
        Ok(records)
    }

    pub async fn last_result(&self, project: &str) -> Result<Option<BuildResult>> {
        Ok(self.collect(project).await?.first().map(|record| record.result))
    }
}

async fn collect_from_node(
    session: Arc<dyn AgentSession>,
    project: &str,
    node_index: usize,
    timeout: Duration,
) -> Result<Vec<BuildRecord>> {
    if !with_timeout(timeout, "job lookup", session.job_exists(project)).await? {
        return Ok(Vec::new());
    }
    let info = with_timeout(timeout, "job info", session.get_job_info(project)).await?;
    let numbers: Vec<u64> = info.builds.iter().map(|build| build.number).collect();

    let accumulator: Mutex<HashMap<u64, PartialBuild>> = Mutex::new(HashMap::new());

    let metadata = async {
        for &number in &numbers {
            match with_timeout(timeout, "build info", session.get_build_info(project, number)).await {
                Ok(build) => {
                    let mut builds = accumulator.lock().unwrap_or_else(|e| e.into_inner());
                    let entry = builds.entry(number).or_default();
                    entry.timestamp = epoch_millis_to_utc(build.timestamp);
                    entry.result = Some(BuildResult::from_remote(build.result.as_deref()));
                }
                Err(e) => log::debug!("No metadata for {} #{}: {}", project, number, e),
            }
        }
    };
    let console = async {
        for &number in &numbers {
            match with_timeout(
                timeout,
                "console output",
                session.get_build_console_output(project, number),
            )
            .await
            {
                Ok(text) => {
                    let mut builds = accumulator.lock().unwrap_or_else(|e| e.into_inner());
                    builds.entry(number).or_default().console_output = Some(text);
                }
                Err(e) => log::debug!("No console output for {} #{}: {}", project, number, e),
            }
        }
    };
    tokio::join!(metadata, console);

    let mut builds = accumulator.into_inner().unwrap_or_else(|e| e.into_inner());
    Ok(numbers
        .iter()
        .filter_map(|&number| {
            builds
                .remove(&number)
                .map(|partial| partial.into_record(node_index, number))
        })
        .collect())
}
