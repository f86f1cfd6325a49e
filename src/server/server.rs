use std::sync::Arc;

use crate::common::config::load_server_config;
use crate::fleet::sync::SystemClock;
use crate::server::context::FleetContext;
use crate::server::loader::{load_agent_connector, load_directory, load_fleet_store, load_job_queue};
use crate::server::rest_server::rest_server_start;

pub async fn server_start(config_path: &str) -> anyhow::Result<()> {
    env_logger::init();
    log::info!("Starting fleet manager...");
    let server_config = load_server_config(config_path)?;

    let store = load_fleet_store(&server_config).await?;
    let directory = load_directory(&server_config).await?;
    let connector = load_agent_connector(&server_config)?;
    let queue = load_job_queue(&server_config);
    log::info!(
        "Job queue at {}:{}, sync every {}s",
        server_config.queue_host,
        server_config.queue_port,
        server_config.sync_interval_secs
    );

    let ctx = FleetContext::new(
        server_config,
        store,
        Arc::new(directory),
        connector,
        queue,
        Arc::new(SystemClock),
    );
    // First pass only removes dangling jobs.
    ctx.sync.sync(None);
    rest_server_start(ctx).await
}
