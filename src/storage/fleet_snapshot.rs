use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::error::{FleetError, Result};
use crate::common::partner::{Node, NodeId, Partner, PartnerId};
use crate::common::project::Project;

/// Whole fleet state as persisted by the file and memory stores.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub partners: BTreeMap<PartnerId, Partner>,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
}

impl FleetSnapshot {
    pub fn gen_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn upsert_partner(&mut self, partner: &Partner) -> Result<()> {
        let clash = self.partners.values().any(|p| {
            p.id != partner.id && (p.short_name == partner.short_name || p.name == partner.name)
        });
        if clash {
            return Err(FleetError::Conflict(format!(
                "partner {} / {} already exists",
                partner.short_name, partner.name
            )));
        }
        self.partners.insert(partner.id, partner.clone());
        Ok(())
    }

    pub fn upsert_node(&mut self, node: &Node) -> Result<()> {
        if self
            .nodes
            .values()
            .any(|n| n.id != node.id && n.token == node.token)
        {
            return Err(FleetError::Conflict(format!("node token of {} is not unique", node.id)));
        }
        self.nodes.insert(node.id, node.clone());
        Ok(())
    }

    pub fn node_by_token(&self, token: &str) -> Option<Node> {
        self.nodes.values().find(|n| n.token == token).cloned()
    }
}
