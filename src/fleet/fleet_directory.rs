use std::collections::HashMap;
use std::sync::Arc;

use crate::common::error::Result;
use crate::common::partner::{FleetNode, Partner, PartnerId};
use crate::fleet::connection::{NodeConnection, NodeStatus};
use crate::storage::fleet_store_impl::FleetStoreImpl;
use crate::traits::fleet_store::FleetStore;

pub struct FleetDirectory {
    store: Arc<FleetStoreImpl>,
    connection: Arc<NodeConnection>,
}

impl FleetDirectory {
    pub fn new(store: Arc<FleetStoreImpl>, connection: Arc<NodeConnection>) -> Self {
        Self { store, connection }
    }

    pub fn connection(&self) -> &Arc<NodeConnection> {
        &self.connection
    }

    /// Nodes whose partner is active, in id order.
    pub async fn active_nodes(&self) -> Result<Vec<FleetNode>> {
        let partners: HashMap<PartnerId, Partner> = self
            .store
            .get_partners()
            .await?
            .into_iter()
            .filter(|partner| partner.active)
            .map(|partner| (partner.id, partner))
            .collect();
        let mut nodes = self.store.get_nodes().await?;
        nodes.sort_by_key(|node| node.id);
        Ok(nodes
            .into_iter()
            .filter_map(|node| {
                partners
                    .get(&node.partner_id)
                    .cloned()
                    .map(|partner| FleetNode { node, partner })
            })
            .collect())
    }

    pub async fn get_online_nodes(&self) -> Result<Vec<FleetNode>> {
        let mut online = Vec::new();
        for node in self.active_nodes().await? {
            if self.probe(&node).await == NodeStatus::Online {
                online.push(node);
            }
        }
        log::debug!("{} node(s) online", online.len());
        Ok(online)
    }

    pub async fn node_statuses(&self) -> Result<Vec<(FleetNode, NodeStatus)>> {
        let mut statuses = Vec::new();
        for node in self.active_nodes().await? {
            let status = self.probe(&node).await;
            statuses.push((node, status));
        }
        Ok(statuses)
    }

    // One node at a time, so at most one probe session is open.
    async fn probe(&self, node: &FleetNode) -> NodeStatus {
        if !node.node.is_registered() {
            log::debug!("Node {} never registered, skipping probe", node.id());
            return NodeStatus::Offline;
        }
        match self.connection.status(node).await {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Treating node {} as offline: {}", node.id(), e);
                NodeStatus::Offline
            }
        }
    }
}
