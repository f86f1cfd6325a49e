use std::sync::{Mutex, MutexGuard};

use crate::common::error::Result;
use crate::common::partner::{Node, NodeId, Partner, PartnerId};
use crate::common::project::Project;
use crate::storage::fleet_snapshot::FleetSnapshot;
use crate::traits::fleet_store::FleetStore;

#[derive(Default)]
pub struct MemoryFleetStore {
    snapshot: Mutex<FleetSnapshot>,
}

impl MemoryFleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FleetSnapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FleetStore for MemoryFleetStore {
    async fn gen_id(&self) -> Result<u64> {
        Ok(self.state().gen_id())
    }

    async fn save_partner(&self, partner: &Partner) -> Result<()> {
        self.state().upsert_partner(partner)
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>> {
        Ok(self.state().partners.get(&id).cloned())
    }

    async fn get_partners(&self) -> Result<Vec<Partner>> {
        Ok(self.state().partners.values().cloned().collect())
    }

    async fn save_node(&self, node: &Node) -> Result<()> {
        self.state().upsert_node(node)
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.state().nodes.get(&id).cloned())
    }

    async fn get_node_by_token(&self, token: &str) -> Result<Option<Node>> {
        Ok(self.state().node_by_token(token))
    }

    async fn get_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.state().nodes.values().cloned().collect())
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        self.state()
            .projects
            .insert(project.name.clone(), project.clone());
        Ok(())
    }

    async fn get_project(&self, name: &str) -> Result<Option<Project>> {
        Ok(self.state().projects.get(name).cloned())
    }

    async fn get_projects(&self) -> Result<Vec<Project>> {
        Ok(self.state().projects.values().cloned().collect())
    }

    async fn delete_project(&self, name: &str) -> Result<()> {
        self.state().projects.remove(name);
        Ok(())
    }
}
