use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type PartnerId = u64;
pub type NodeId = u64;

/// Host recorded for a node that has not self-registered yet.
pub const UNREGISTERED_HOST: &str = "0.0.0.0";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Partner {
    pub id: PartnerId,
    pub short_name: String,
    pub name: String,
    pub active: bool,
}

impl Partner {
    /// Directory identity the partner's nodes authenticate builds with.
    pub fn service_identity(&self) -> String {
        format!("{}_jenkins", self.short_name)
    }

    pub fn admin_identity(&self) -> String {
        format!("{}_jenkins_admin", self.short_name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub token: String,
    pub host: String,
    pub port: u16,
    pub partner_id: PartnerId,
}

impl Node {
    pub fn new(id: NodeId, partner_id: PartnerId) -> Self {
        Self {
            id,
            token: generate_token(),
            host: UNREGISTERED_HOST.to_string(),
            port: 0,
            partner_id,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.host != UNREGISTERED_HOST
    }
}

/// A node paired with the partner that owns it.
#[derive(Debug, Clone)]
pub struct FleetNode {
    pub node: Node,
    pub partner: Partner,
}

impl FleetNode {
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn identity(&self) -> String {
        self.partner.service_identity()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.node.host, self.node.port)
    }
}

/// 40 hex chars, unique per node.
pub fn generate_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hasher.update(rand::random::<[u8; 4]>());
    let digest = hasher.finalize();
    let mut token = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    token.truncate(40);
    token
}
