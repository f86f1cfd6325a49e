use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::common::partner::PartnerId;
use crate::rest::ApiResult;
use crate::server::context::FleetContext;

#[derive(Deserialize)]
pub struct CreatePartner {
    pub short_name: String,
    pub name: String,
    #[serde(default = "default_node_amount")]
    pub node_amount: usize,
}

fn default_node_amount() -> usize {
    1
}

pub async fn create_partner(
    State(ctx): State<FleetContext>,
    Json(req): Json<CreatePartner>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let (partner, nodes) = ctx
        .registry
        .provision_partner(&req.short_name, &req.name, req.node_amount)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "partner": partner,
            "nodes": nodes.iter().map(|node| {
                serde_json::json!({ "id": node.id, "token": node.token })
            }).collect::<Vec<_>>(),
        })),
    ))
}

pub async fn block_partner(
    State(ctx): State<FleetContext>,
    Path(id): Path<PartnerId>,
) -> ApiResult<Json<serde_json::Value>> {
    let partner = ctx.registry.set_partner_active(id, false).await?;
    Ok(Json(serde_json::json!({ "partner": partner })))
}

pub async fn unblock_partner(
    State(ctx): State<FleetContext>,
    Path(id): Path<PartnerId>,
) -> ApiResult<Json<serde_json::Value>> {
    let partner = ctx.registry.set_partner_active(id, true).await?;
    Ok(Json(serde_json::json!({ "partner": partner })))
}
