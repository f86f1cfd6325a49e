use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::common::error::{FleetError, Result};
use crate::common::partner::{Node, Partner, PartnerId};
use crate::common::utils::is_slug;
use crate::fleet::credential::CredentialBroker;
use crate::storage::fleet_store_impl::FleetStoreImpl;
use crate::traits::fleet_store::FleetStore;

/// Partner onboarding and node self-registration.
pub struct Registry {
    store: Arc<FleetStoreImpl>,
    broker: Arc<CredentialBroker>,
}

impl Registry {
    pub fn new(store: Arc<FleetStoreImpl>, broker: Arc<CredentialBroker>) -> Self {
        Self { store, broker }
    }

    /// Creates both directory identities of the partner, then the partner
    /// and `node_amount` unregistered nodes. The partner is only stored once
    /// its identities exist, so a failed attempt can simply be retried.
    pub async fn provision_partner(
        &self,
        short_name: &str,
        name: &str,
        node_amount: usize,
    ) -> Result<(Partner, Vec<Node>)> {
        if !is_slug(short_name) {
            return Err(FleetError::InvalidState(format!(
                "short name {:?} is not a slug",
                short_name
            )));
        }
        let partners = self.store.get_partners().await?;
        if partners.iter().any(|p| p.short_name == short_name || p.name == name) {
            return Err(FleetError::Conflict(format!(
                "partner {} ({}) already exists",
                short_name, name
            )));
        }
        let partner = Partner {
            id: self.store.gen_id().await?,
            short_name: short_name.to_string(),
            name: name.to_string(),
            active: true,
        };
        for identity in [partner.service_identity(), partner.admin_identity()] {
            match self.broker.provision(&identity).await {
                Ok(()) => {}
                // Left behind by an earlier attempt that failed before storing the partner.
                Err(FleetError::Conflict(_)) => {
                    log::warn!("Adopting existing directory identity {}", identity)
                }
                Err(e) => return Err(e),
            }
        }
        self.store.save_partner(&partner).await?;

        let mut nodes = Vec::with_capacity(node_amount);
        for _ in 0..node_amount {
            let node = Node::new(self.store.gen_id().await?, partner.id);
            self.store.save_node(&node).await?;
            nodes.push(node);
        }
        log::info!(
            "Provisioned partner {} with {} node(s)",
            partner.short_name,
            nodes.len()
        );
        Ok((partner, nodes))
    }

    pub async fn set_partner_active(&self, id: PartnerId, active: bool) -> Result<Partner> {
        let mut partner = self
            .store
            .get_partner(id)
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("partner {}", id)))?;
        partner.active = active;
        self.store.save_partner(&partner).await?;
        log::info!(
            "Partner {} is now {}",
            partner.short_name,
            if active { "active" } else { "blocked" }
        );
        Ok(partner)
    }

    /// Binds the node owning `token` to the address its agent reported.
    pub async fn register_node(&self, token: &str, host: &str, port: u16) -> Result<Node> {
        let mut node = self
            .store
            .get_node_by_token(token)
            .await?
            .ok_or_else(|| FleetError::NotFound("no node with that token".to_string()))?;
        node.host = host.to_string();
        node.port = port;
        self.store.save_node(&node).await?;
        log::info!("Node {} registered at {}:{}", node.id, host, port);
        log::info!("Network ACL must be updated to admit {}", host);
        Ok(node)
    }

    /// Distinct addresses of registered nodes under active partners.
    pub async fn whitelist(&self) -> Result<Vec<String>> {
        let active: HashSet<PartnerId> = self
            .store
            .get_partners()
            .await?
            .into_iter()
            .filter(|partner| partner.active)
            .map(|partner| partner.id)
            .collect();
        let hosts: BTreeSet<String> = self
            .store
            .get_nodes()
            .await?
            .into_iter()
            .filter(|node| node.is_registered() && active.contains(&node.partner_id))
            .map(|node| node.host)
            .collect();
        Ok(hosts.into_iter().collect())
    }
}
