use serde::Serialize;
use std::collections::BTreeMap;

use crate::common::error::Result;

pub const BUILD_ACTION: &str = "build";
pub const STOP_ACTION: &str = "stop";

/// One unit of work submitted to the job queue.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct JobQueueTask {
    pub name: String,
    pub action: String,
    pub target_project: String,
    pub node_label: Option<String>,
    pub params: BTreeMap<String, String>,
    /// Queue-side idempotency key.
    pub unique_id: String,
}

fn default_params() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "OFFLINE_NODE_WHEN_COMPLETE".to_string(),
        "false".to_string(),
    )])
}

impl JobQueueTask {
    pub fn build(
        project: &str,
        label: Option<&str>,
        overrides: Option<&BTreeMap<String, String>>,
    ) -> Self {
        let name = match label {
            Some(label) => format!("{}:{}:{}", BUILD_ACTION, project, label),
            None => format!("{}:{}", BUILD_ACTION, project),
        };
        let mut params = default_params();
        if let Some(overrides) = overrides {
            params.extend(overrides.clone());
        }
        Self {
            name,
            action: BUILD_ACTION.to_string(),
            target_project: project.to_string(),
            node_label: label.map(str::to_string),
            params,
            unique_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Abort request addressed to the queue host rather than to a node.
    pub fn stop(queue_host: &str, project: &str) -> Self {
        let mut params = default_params();
        params.insert("name".to_string(), project.to_string());
        Self {
            name: format!("{}:{}", STOP_ACTION, queue_host),
            action: STOP_ACTION.to_string(),
            target_project: project.to_string(),
            node_label: None,
            params,
            unique_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// JSON argument carried by the queue packet.
    pub fn payload(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_names_with_and_without_label() {
        assert_eq!(JobQueueTask::build("demo", None, None).name, "build:demo");
        let labelled = JobQueueTask::build("demo", Some("ppc64le_ubuntu_16_04"), None);
        assert_eq!(labelled.name, "build:demo:ppc64le_ubuntu_16_04");
        assert_eq!(labelled.node_label.as_deref(), Some("ppc64le_ubuntu_16_04"));
    }

    #[test]
    fn overrides_merge_over_defaults() {
        let overrides = BTreeMap::from([
            ("OFFLINE_NODE_WHEN_COMPLETE".to_string(), "true".to_string()),
            ("BRANCH".to_string(), "main".to_string()),
        ]);
        let task = JobQueueTask::build("demo", None, Some(&overrides));
        assert_eq!(task.params["OFFLINE_NODE_WHEN_COMPLETE"], "true");
        assert_eq!(task.params["BRANCH"], "main");
        assert_eq!(
            task.payload().unwrap(),
            r#"{"BRANCH":"main","OFFLINE_NODE_WHEN_COMPLETE":"true"}"#
        );
    }

    #[test]
    fn stop_targets_queue_host() {
        let task = JobQueueTask::stop("gearman.internal", "demo");
        assert_eq!(task.name, "stop:gearman.internal");
        assert_eq!(task.params["name"], "demo");
        assert_eq!(task.params["OFFLINE_NODE_WHEN_COMPLETE"], "false");
        assert_eq!(task.unique_id.len(), 32);
    }

    #[test]
    fn unique_ids_differ() {
        let a = JobQueueTask::build("demo", None, None);
        let b = JobQueueTask::build("demo", None, None);
        assert_ne!(a.unique_id, b.unique_id);
    }
}
