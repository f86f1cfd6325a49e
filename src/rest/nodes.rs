use axum::{extract::State, Json};
use serde::Deserialize;

use crate::rest::ApiResult;
use crate::server::context::FleetContext;

#[derive(Deserialize)]
pub struct RegisterNode {
    pub token: String,
    pub host: String,
    pub port: u16,
}

pub async fn register_node(
    State(ctx): State<FleetContext>,
    Json(req): Json<RegisterNode>,
) -> ApiResult<Json<serde_json::Value>> {
    let node = ctx.registry.register_node(&req.token, &req.host, req.port).await?;
    Ok(Json(serde_json::json!({
        "id": node.id,
        "host": node.host,
        "port": node.port,
    })))
}

pub async fn get_nodes(State(ctx): State<FleetContext>) -> ApiResult<Json<serde_json::Value>> {
    let statuses = ctx.fleet.node_statuses().await?;
    Ok(Json(serde_json::json!({
        "nodes": statuses.iter().map(|(node, status)| {
            serde_json::json!({
                "id": node.id(),
                "partner": node.partner.short_name,
                "host": node.node.host,
                "port": node.node.port,
                "status": status,
            })
        }).collect::<Vec<_>>()
    })))
}

pub async fn get_whitelist(State(ctx): State<FleetContext>) -> ApiResult<Json<serde_json::Value>> {
    let hosts = ctx.registry.whitelist().await?;
    Ok(Json(serde_json::json!({ "hosts": hosts })))
}

pub async fn get_workers(State(ctx): State<FleetContext>) -> ApiResult<Json<serde_json::Value>> {
    let workers = ctx.dispatcher.worker_hosts().await?;
    Ok(Json(serde_json::json!({
        "workers": workers.iter().map(|ip| ip.to_string()).collect::<Vec<_>>()
    })))
}
