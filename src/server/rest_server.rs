use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::rest::{
    nodes::{get_nodes, get_whitelist, get_workers, register_node},
    partners::{block_partner, create_partner, unblock_partner},
    projects::{abort_build, delete_project, get_builds, get_projects, trigger_build, upsert_project},
};
use crate::server::context::FleetContext;

pub fn router(ctx: FleetContext) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/nodes", get(get_nodes))
        .route("/nodes/register", post(register_node))
        .route("/whitelist", get(get_whitelist))
        .route("/workers", get(get_workers))
        .route("/partners", post(create_partner))
        .route("/partners/{id}/block", post(block_partner))
        .route("/partners/{id}/unblock", post(unblock_partner))
        .route("/projects", get(get_projects).post(upsert_project))
        .route("/projects/{name}", delete(delete_project))
        .route("/projects/{name}/builds", get(get_builds))
        .route("/projects/{name}/build", post(trigger_build))
        .route("/projects/{name}/abort", post(abort_build))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ctx)
}

pub async fn rest_server_start(ctx: FleetContext) -> anyhow::Result<()> {
    let address = format!("{}:{}", ctx.config.host, ctx.config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    log::info!("Fleet REST API listening on {}", address);
    axum::serve(listener, router(ctx)).await.map_err(|e| {
        log::error!("Failed to start server: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;
    Ok(())
}

async fn health(State(ctx): State<FleetContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "config": {
            "sync_interval_secs": ctx.config.sync_interval_secs,
            "remove_dangling_jobs": ctx.config.remove_dangling_jobs,
        }
    }))
}
