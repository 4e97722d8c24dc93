use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use http::StatusCode;
use labbox_shared::errors::LabboxError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::error::ApiError;
use super::extract::UserId;
use crate::instance::{Instance, InstanceId};
use crate::management::InstanceManager;

type Manager = State<Arc<InstanceManager>>;

#[derive(Debug, Deserialize)]
pub(super) struct FlagRequest {
    flag: String,
}

#[derive(Debug, Serialize)]
pub(super) struct FlagResponse {
    ok: bool,
}

pub(super) async fn health() -> StatusCode {
    StatusCode::OK
}

pub(super) async fn run_instance(
    State(manager): Manager,
    UserId(user_id): UserId,
    Path(challenge_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    manager.run(&user_id, &challenge_id).await?;
    Ok(Json(json!({})))
}

pub(super) async fn destroy_instance(
    State(manager): Manager,
    UserId(user_id): UserId,
    Path(challenge_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    manager
        .destroy(&InstanceId::derive(&user_id, &challenge_id))
        .await?;
    Ok(Json(json!({})))
}

pub(super) async fn submit_flag(
    State(manager): Manager,
    UserId(user_id): UserId,
    Path(challenge_id): Path<String>,
    Json(request): Json<FlagRequest>,
) -> Result<Json<FlagResponse>, ApiError> {
    let ok = manager
        .submit_flag(&InstanceId::derive(&user_id, &challenge_id), &request.flag)
        .await?;
    Ok(Json(FlagResponse { ok }))
}

/// The caller's instance view, or `{}` when there is none.
pub(super) async fn get_instance(
    State(manager): Manager,
    UserId(user_id): UserId,
    Path(challenge_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let view = match manager.get_instance(&user_id, &challenge_id)? {
        Some(instance) => serde_json::to_value(instance.view())
            .map_err(|e| LabboxError::Internal(format!("serialize instance view: {e}")))?,
        None => json!({}),
    };
    Ok(Json(view))
}

pub(super) async fn list_instances(
    State(manager): Manager,
) -> Result<Json<Vec<Instance>>, ApiError> {
    Ok(Json(manager.list_instances()?))
}

fn parse_instance_id(raw: &str) -> Result<InstanceId, LabboxError> {
    InstanceId::parse(raw)
        .ok_or_else(|| LabboxError::InvalidArgument(format!("malformed instance id: {raw}")))
}

/// Full record of one instance, flag included.
pub(super) async fn admin_get_instance(
    State(manager): Manager,
    Path(id): Path<String>,
) -> Result<Json<Instance>, ApiError> {
    let id = parse_instance_id(&id)?;
    let instance = manager
        .find_instance(&id)?
        .ok_or_else(|| LabboxError::InstanceNotFound(id.to_string()))?;
    Ok(Json(instance))
}

pub(super) async fn admin_destroy_instance(
    State(manager): Manager,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_instance_id(&id)?;
    manager.destroy(&id).await?;
    Ok(Json(json!({})))
}
