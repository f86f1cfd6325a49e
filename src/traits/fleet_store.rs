use crate::common::{
    error::Result,
    partner::{Node, NodeId, Partner, PartnerId},
    project::Project,
};

#[trait_variant::make(FleetStore: Send)]
pub trait UnsendFleetStore {
    async fn gen_id(&self) -> Result<u64>;
    async fn save_partner(&self, partner: &Partner) -> Result<()>;
    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>>;
    async fn get_partners(&self) -> Result<Vec<Partner>>;
    async fn save_node(&self, node: &Node) -> Result<()>;
    async fn get_node(&self, id: NodeId) -> Result<Option<Node>>;
    async fn get_node_by_token(&self, token: &str) -> Result<Option<Node>>;
    async fn get_nodes(&self) -> Result<Vec<Node>>;
    async fn save_project(&self, project: &Project) -> Result<()>;
    async fn get_project(&self, name: &str) -> Result<Option<Project>>;
    async fn get_projects(&self) -> Result<Vec<Project>>;
    async fn delete_project(&self, name: &str) -> Result<()>;
}
