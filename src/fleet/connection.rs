use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::common::error::{FleetError, Result};
use crate::common::partner::{FleetNode, NodeId};
use crate::common::utils::with_timeout;
use crate::fleet::credential::CredentialBroker;
use crate::traits::agent::{AgentConnector, AgentSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
}

struct NodeSlot {
    state: ConnectionState,
    identity: String,
    hash: Option<String>,
    session: Option<Arc<dyn AgentSession>>,
    // Held until the secret of this session is burned.
    turn: Option<OwnedMutexGuard<()>>,
}

type SlotTable = Arc<DashMap<NodeId, NodeSlot>>;

/// Tracks the single live session each node may have. A slot exists only
/// while a node is not Idle.
///
/// Nodes of one partner share a directory identity, so their sessions are
/// serialized: `connect` waits until no sibling holds a session. A task that
/// already holds a session must not connect to a sibling node.
pub struct NodeConnection {
    broker: Arc<CredentialBroker>,
    connector: Arc<dyn AgentConnector>,
    slots: SlotTable,
    turns: DashMap<String, Arc<Mutex<()>>>,
    timeout: Duration,
}

/// Releases the slot when dropped while armed, so a cancelled caller
/// still burns its secret and frees the node.
struct SlotGuard<'a> {
    connection: &'a NodeConnection,
    id: NodeId,
    armed: bool,
}

impl<'a> SlotGuard<'a> {
    fn new(connection: &'a NodeConnection, id: NodeId) -> Self {
        Self {
            connection,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("Releasing abandoned session of node {}", self.id);
            self.connection.release(self.id);
        }
    }
}

impl NodeConnection {
    pub fn new(broker: Arc<CredentialBroker>, connector: Arc<dyn AgentConnector>, timeout: Duration) -> Self {
        Self {
            broker,
            connector,
            slots: Arc::new(DashMap::new()),
            turns: DashMap::new(),
            timeout,
        }
    }

    pub fn state(&self, id: NodeId) -> ConnectionState {
        self.slots
            .get(&id)
            .map(|slot| slot.state)
            .unwrap_or(ConnectionState::Idle)
    }

    pub async fn connect(&self, node: &FleetNode) -> Result<Arc<dyn AgentSession>> {
        let id = node.id();
        let identity = node.identity();
        match self.slots.entry(id) {
            Entry::Occupied(slot) => {
                return Err(FleetError::InvalidState(format!(
                    "node {} is already {:?}",
                    id,
                    slot.get().state
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(NodeSlot {
                    state: ConnectionState::Connecting,
                    identity: identity.clone(),
                    hash: None,
                    session: None,
                    turn: None,
                });
            }
        }
        let guard = SlotGuard::new(self, id);

        match self.open(node, &identity).await {
            Ok(session) => {
                if let Some(mut slot) = self.slots.get_mut(&id) {
                    slot.state = ConnectionState::Connected;
                    slot.session = Some(session.clone());
                }
                guard.disarm();
                log::debug!("Connected to node {} at {}", id, node.address());
                Ok(session)
            }
            Err(e) => {
                guard.disarm();
                if let Some(burn) = self.release(id) {
                    if let Err(burn_err) = join_burn(burn).await {
                        log::warn!("Could not burn unused secret of {}: {}", identity, burn_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn open(&self, node: &FleetNode, identity: &str) -> Result<Arc<dyn AgentSession>> {
        let lock = self.turns.entry(identity.to_string()).or_default().clone();
        let turn = lock.lock_owned().await;
        if let Some(mut slot) = self.slots.get_mut(&node.id()) {
            slot.turn = Some(turn);
        }

        let credential = self.broker.fetch(identity).await?;
        if let Some(mut slot) = self.slots.get_mut(&node.id()) {
            slot.hash = Some(credential.hash.clone());
        }
        with_timeout(
            self.timeout,
            "agent connect",
            self.connector.open(
                &node.node.host,
                node.node.port,
                &credential.username,
                &credential.secret,
            ),
        )
        .await
    }

    /// Marks the slot Disconnecting and burns its secret on a spawned task,
    /// which removes the slot once done. Cancelling the caller does not stop
    /// the burn.
    fn release(&self, id: NodeId) -> Option<JoinHandle<Result<()>>> {
        let (identity, hash) = {
            let mut slot = self.slots.get_mut(&id)?;
            slot.state = ConnectionState::Disconnecting;
            slot.session = None;
            (slot.identity.clone(), slot.hash.take())
        };
        self.spawn_burn(id, identity, hash)
    }

    fn spawn_burn(&self, id: NodeId, identity: String, hash: Option<String>) -> Option<JoinHandle<Result<()>>> {
        let slots = self.slots.clone();
        let broker = self.broker.clone();
        let burn = async move {
            let outcome = match hash {
                Some(hash) => broker.invalidate(&identity, &hash).await,
                None => Ok(()),
            };
            if let Err(e) = &outcome {
                log::warn!("Could not burn secret of {} used by node {}: {}", identity, id, e);
            }
            slots.remove(&id);
            outcome
        };
        match Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(burn)),
            Err(_) => {
                log::error!("No runtime to burn the secret of node {}, dropping its slot", id);
                self.slots.remove(&id);
                None
            }
        }
    }

    pub async fn disconnect(&self, node: &FleetNode) -> Result<()> {
        let id = node.id();
        let (identity, hash) = {
            let mut slot = self
                .slots
                .get_mut(&id)
                .ok_or_else(|| FleetError::InvalidState(format!("node {} is not connected", id)))?;
            if slot.state != ConnectionState::Connected {
                return Err(FleetError::InvalidState(format!(
                    "node {} is {:?}, not connected",
                    id, slot.state
                )));
            }
            slot.state = ConnectionState::Disconnecting;
            slot.session = None;
            (slot.identity.clone(), slot.hash.take())
        };

        let outcome = match self.spawn_burn(id, identity, hash) {
            Some(burn) => join_burn(burn).await,
            None => Ok(()),
        };
        log::debug!("Disconnected from node {}", id);
        outcome
    }

    /// Connects, probes the agent version and always disconnects again.
    pub async fn status(&self, node: &FleetNode) -> Result<NodeStatus> {
        let session = match self.connect(node).await {
            Ok(session) => session,
            Err(e @ (FleetError::Unreachable(_) | FleetError::NotFound(_))) => {
                log::warn!("Node {} at {} unreachable: {}", node.id(), node.address(), e);
                return Ok(NodeStatus::Offline);
            }
            Err(e) => return Err(e),
        };
        let guard = SlotGuard::new(self, node.id());

        let probe = with_timeout(self.timeout, "version probe", session.get_version()).await;
        drop(session);
        guard.disarm();
        let released = self.disconnect(node).await;

        let status = match probe {
            Ok(version) => {
                log::debug!("Node {} runs agent version {}", node.id(), version);
                NodeStatus::Online
            }
            Err(e) => {
                log::warn!("Node {} failed its probe: {}", node.id(), e);
                NodeStatus::Offline
            }
        };
        released?;
        Ok(status)
    }

    /// Runs `f` with a live session; the node is disconnected on every exit
    /// path, including when the returned future is dropped.
    pub async fn with_session<T, F, Fut>(&self, node: &FleetNode, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn AgentSession>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.connect(node).await?;
        let guard = SlotGuard::new(self, node.id());
        let outcome = f(session).await;
        guard.disarm();
        let released = self.disconnect(node).await;
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), released) => {
                if let Err(release_err) = released {
                    log::warn!("Disconnect of node {} failed: {}", node.id(), release_err);
                }
                Err(e)
            }
        }
    }
}

async fn join_burn(burn: JoinHandle<Result<()>>) -> Result<()> {
    burn.await
        .map_err(|e| FleetError::Storage(format!("secret burn task failed: {}", e)))?
}
