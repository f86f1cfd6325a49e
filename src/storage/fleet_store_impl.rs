use crate::common::error::Result;
use crate::common::partner::{Node, NodeId, Partner, PartnerId};
use crate::common::project::Project;
use crate::storage::file::file_fleet_store::FileFleetStore;
use crate::storage::memory::memory_fleet_store::MemoryFleetStore;
use crate::traits::fleet_store::FleetStore;

pub enum FleetStoreImpl {
    File(FileFleetStore),
    Memory(MemoryFleetStore),
}

impl FleetStore for FleetStoreImpl {
    async fn gen_id(&self) -> Result<u64> {
        match self {
            FleetStoreImpl::File(f) => f.gen_id().await,
            FleetStoreImpl::Memory(m) => m.gen_id().await,
        }
    }

    async fn save_partner(&self, partner: &Partner) -> Result<()> {
        match self {
            FleetStoreImpl::File(f) => f.save_partner(partner).await,
            FleetStoreImpl::Memory(m) => m.save_partner(partner).await,
        }
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>> {
        match self {
            FleetStoreImpl::File(f) => f.get_partner(id).await,
            FleetStoreImpl::Memory(m) => m.get_partner(id).await,
        }
    }

    async fn get_partners(&self) -> Result<Vec<Partner>> {
        match self {
            FleetStoreImpl::File(f) => f.get_partners().await,
            FleetStoreImpl::Memory(m) => m.get_partners().await,
        }
    }

    async fn save_node(&self, node: &Node) -> Result<()> {
        match self {
            FleetStoreImpl::File(f) => f.save_node(node).await,
            FleetStoreImpl::Memory(m) => m.save_node(node).await,
        }
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        match self {
            FleetStoreImpl::File(f) => f.get_node(id).await,
            FleetStoreImpl::Memory(m) => m.get_node(id).await,
        }
    }

    async fn get_node_by_token(&self, token: &str) -> Result<Option<Node>> {
        match self {
            FleetStoreImpl::File(f) => f.get_node_by_token(token).await,
            FleetStoreImpl::Memory(m) => m.get_node_by_token(token).await,
        }
    }

    async fn get_nodes(&self) -> Result<Vec<Node>> {
        match self {
            FleetStoreImpl::File(f) => f.get_nodes().await,
            FleetStoreImpl::Memory(m) => m.get_nodes().await,
        }
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        match self {
            FleetStoreImpl::File(f) => f.save_project(project).await,
            FleetStoreImpl::Memory(m) => m.save_project(project).await,
        }
    }

    async fn get_project(&self, name: &str) -> Result<Option<Project>> {
        match self {
            FleetStoreImpl::File(f) => f.get_project(name).await,
            FleetStoreImpl::Memory(m) => m.get_project(name).await,
        }
    }

    async fn get_projects(&self) -> Result<Vec<Project>> {
        match self {
            FleetStoreImpl::File(f) => f.get_projects().await,
            FleetStoreImpl::Memory(m) => m.get_projects().await,
        }
    }

    async fn delete_project(&self, name: &str) -> Result<()> {
        match self {
            FleetStoreImpl::File(f) => f.delete_project(name).await,
            FleetStoreImpl::Memory(m) => m.delete_project(name).await,
        }
    }
}
