use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::common::error::{FleetError, Result};
use crate::common::project::Project;
use crate::common::utils::{is_slug, with_timeout};
use crate::fleet::dispatcher::JobDispatcher;
use crate::fleet::fleet_directory::FleetDirectory;
use crate::fleet::sync::SyncController;
use crate::storage::fleet_store_impl::FleetStoreImpl;
use crate::traits::fleet_store::FleetStore;

/// Project lifecycle. Every change is handed to the sync controller.
pub struct ProjectCatalog {
    store: Arc<FleetStoreImpl>,
    fleet: Arc<FleetDirectory>,
    dispatcher: Arc<JobDispatcher>,
    sync: Arc<SyncController>,
    timeout: Duration,
}

impl ProjectCatalog {
    pub fn new(
        store: Arc<FleetStoreImpl>,
        fleet: Arc<FleetDirectory>,
        dispatcher: Arc<JobDispatcher>,
        sync: Arc<SyncController>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            fleet,
            dispatcher,
            sync,
            timeout,
        }
    }

    pub async fn get(&self, name: &str) -> Result<Project> {
        self.store
            .get_project(name)
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("project {}", name)))
    }

    pub async fn list(&self) -> Result<Vec<Project>> {
        self.store.get_projects().await
    }

    pub async fn upsert(&self, project: &Project) -> Result<()> {
        if !is_slug(&project.name) {
            return Err(FleetError::InvalidState(format!(
                "project name {:?} is not a slug",
                project.name
            )));
        }
        self.store.save_project(project).await?;
        log::info!("Saved project {}", project.name);
        self.sync.sync(Some(&project.name));
        Ok(())
    }

    /// Removes the job from every online node that has it, then forgets the project.
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.get(name).await?;
        let timeout = self.timeout;
        for node in self.fleet.get_online_nodes().await? {
            let removed = self
                .fleet
                .connection()
                .with_session(&node, |session| async move {
                    if with_timeout(timeout, "job lookup", session.job_exists(name)).await? {
                        with_timeout(timeout, "job delete", session.delete_job(name)).await?;
                        return Ok(true);
                    }
                    Ok::<_, FleetError>(false)
                })
                .await;
            match removed {
                Ok(true) => log::info!("Deleted job {} on node {}", name, node.id()),
                Ok(false) => {}
                Err(e) => log::warn!("Could not delete job {} on node {}: {}", name, node.id(), e),
            }
        }
        self.store.delete_project(name).await?;
        log::info!("Deleted project {}", name);
        Ok(())
    }

    pub async fn trigger_build(
        &self,
        name: &str,
        overrides: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<String>> {
        let project = self.get(name).await?;
        let ids = self
            .dispatcher
            .submit_build(&project.name, &project.labels, overrides)
            .await?;
        self.sync.sync(Some(&project.name));
        Ok(ids)
    }

    pub async fn abort(&self, name: &str) -> Result<()> {
        let project = self.get(name).await?;
        self.dispatcher.submit_abort(&project.name).await
    }
}
