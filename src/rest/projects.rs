use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::common::project::Project;
use crate::rest::ApiResult;
use crate::server::context::FleetContext;

#[derive(Deserialize, Default)]
pub struct TriggerBuild {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

pub async fn get_projects(State(ctx): State<FleetContext>) -> ApiResult<Json<serde_json::Value>> {
    let projects = ctx.projects.list().await?;
    Ok(Json(serde_json::json!({ "projects": projects })))
}

pub async fn upsert_project(
    State(ctx): State<FleetContext>,
    Json(project): Json<Project>,
) -> ApiResult<StatusCode> {
    ctx.projects.upsert(&project).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_project(
    State(ctx): State<FleetContext>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.projects.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_builds(
    State(ctx): State<FleetContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = ctx.projects.get(&name).await?;
    let builds = ctx.aggregator.collect(&project.name).await?;
    Ok(Json(serde_json::json!({
        "project": project.name,
        "lastResult": builds.first().map(|b| b.result),
        "builds": builds,
    })))
}

/// Fails with 502 when the queue cannot be reached.
pub async fn trigger_build(
    State(ctx): State<FleetContext>,
    Path(name): Path<String>,
    body: Option<Json<TriggerBuild>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let Json(req) = body.unwrap_or_default();
    let overrides = (!req.params.is_empty()).then_some(&req.params);
    let ids = ctx.projects.trigger_build(&name, overrides).await?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "jobs": ids }))))
}

pub async fn abort_build(
    State(ctx): State<FleetContext>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.projects.abort(&name).await?;
    Ok(StatusCode::ACCEPTED)
}
