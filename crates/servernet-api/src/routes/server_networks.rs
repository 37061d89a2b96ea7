use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use servernet::types::{ServerNetworkConfig, ServerNetworkState};

use crate::dto::UpdateServerNetworkRequest;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_server_network(
    State(state): State<AppState>,
    payload: Result<Json<ServerNetworkConfig>, JsonRejection>,
) -> Result<(StatusCode, Json<ServerNetworkState>), ApiError> {
    let Json(req) = payload?;
    let cancel = state.shutdown.child_token();

    let created = match state.networks.create(&req, &cancel).await {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(server_id = req.server_id, error = %e, "failed to create server network");
            return Err(ApiError::ServerNetwork(e));
        }
    };

    Ok((StatusCode::CREATED, Json(created)))
}

/// Look up an attachment by id alone. Alias IPs come back in cloud order.
pub async fn get_server_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServerNetworkState>, ApiError> {
    let cancel = state.shutdown.child_token();

    state
        .networks
        .import(&id, &cancel)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// Re-read a stored record. 404 means the caller should drop it.
pub async fn refresh_server_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ServerNetworkState>, JsonRejection>,
) -> Result<Json<ServerNetworkState>, ApiError> {
    let Json(prior) = payload?;
    check_id(&id, &prior)?;
    let cancel = state.shutdown.child_token();

    state
        .networks
        .read(&prior, &cancel)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn update_server_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateServerNetworkRequest>, JsonRejection>,
) -> Result<Json<ServerNetworkState>, ApiError> {
    let Json(req) = payload?;
    check_id(&id, &req.prior)?;
    let cancel = state.shutdown.child_token();

    state
        .networks
        .update(&req.prior, &req.alias_ips, &cancel)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn delete_server_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let cancel = state.shutdown.child_token();
    state.networks.delete(&id, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn check_id(id: &str, prior: &ServerNetworkState) -> Result<(), ApiError> {
    if prior.id != id {
        return Err(ApiError::BadRequest(format!(
            "record id {} does not match path id {id}",
            prior.id
        )));
    }
    Ok(())
}
