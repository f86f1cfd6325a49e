use std::sync::Arc;

use crate::common::config::ServerConfig;
use crate::common::secret::SecretPolicy;
use crate::fleet::aggregator::BuildAggregator;
use crate::fleet::connection::NodeConnection;
use crate::fleet::credential::CredentialBroker;
use crate::fleet::dispatcher::JobDispatcher;
use crate::fleet::fleet_directory::FleetDirectory;
use crate::fleet::projects::ProjectCatalog;
use crate::fleet::registry::Registry;
use crate::fleet::sync::{Clock, SyncController};
use crate::storage::directory_impl::DirectoryImpl;
use crate::storage::fleet_store_impl::FleetStoreImpl;
use crate::traits::agent::AgentConnector;
use crate::traits::job_queue::JobQueue;

/// Every service the REST handlers reach, wired once at startup.
#[derive(Clone)]
pub struct FleetContext {
    pub config: Arc<ServerConfig>,
    pub store: Arc<FleetStoreImpl>,
    pub broker: Arc<CredentialBroker>,
    pub connection: Arc<NodeConnection>,
    pub fleet: Arc<FleetDirectory>,
    pub aggregator: Arc<BuildAggregator>,
    pub dispatcher: Arc<JobDispatcher>,
    pub sync: Arc<SyncController>,
    pub registry: Arc<Registry>,
    pub projects: Arc<ProjectCatalog>,
}

impl FleetContext {
    pub fn new(
        config: ServerConfig,
        store: FleetStoreImpl,
        directory: Arc<DirectoryImpl>,
        connector: Arc<dyn AgentConnector>,
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timeout = config.remote_timeout();
        let store = Arc::new(store);
        let broker = Arc::new(CredentialBroker::new(
            directory,
            SecretPolicy::new(config.secret_length, &config.secret_charset),
            timeout,
        ));
        let connection = Arc::new(NodeConnection::new(broker.clone(), connector, timeout));
        let fleet = Arc::new(FleetDirectory::new(store.clone(), connection.clone()));
        let aggregator = Arc::new(BuildAggregator::new(fleet.clone(), timeout));
        let dispatcher = Arc::new(JobDispatcher::new(queue, &config));
        let sync = Arc::new(SyncController::new(
            fleet.clone(),
            store.clone(),
            clock,
            config.sync_interval(),
            config.remove_dangling_jobs,
            timeout,
        ));
        let registry = Arc::new(Registry::new(store.clone(), broker.clone()));
        let projects = Arc::new(ProjectCatalog::new(
            store.clone(),
            fleet.clone(),
            dispatcher.clone(),
            sync.clone(),
            timeout,
        ));
        Self {
            config: Arc::new(config),
            store,
            broker,
            connection,
            fleet,
            aggregator,
            dispatcher,
            sync,
            registry,
            projects,
        }
    }
}
