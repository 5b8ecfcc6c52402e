//! Block registry handlers

use std::net::IpAddr;

use axum::{extract::{State, Path, Query}, http::StatusCode, Json};
use serde::Serialize;
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::logic::response::BlockOutcome;
use crate::models::{BlockFilter, BlockIpRequest, BlockedIp};

const MANUAL_REASON: &str = "Manual block";

#[derive(Debug, Serialize)]
pub struct BlockResponse {
    pub block: BlockedIp,
    /// Firewall rules were confirmed in place
    pub enforced: bool,
    pub already_blocked: bool,
}

/// List active blocks, or the whole history with `include_inactive=true`
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<BlockFilter>,
) -> AppResult<Json<Vec<BlockedIp>>> {
    let blocks = BlockedIp::list(&state.pool, filter.include_inactive.unwrap_or(false)).await?;
    Ok(Json(blocks))
}

/// Manually block an IP
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<BlockIpRequest>,
) -> AppResult<(StatusCode, Json<BlockResponse>)> {
    req.validate()
        .map_err(|_| AppError::ValidationError("Invalid IP address format".to_string()))?;
    let ip = parse_ip(&req.ip_address)?;
    let reason = req.reason.as_deref().filter(|r| !r.trim().is_empty()).unwrap_or(MANUAL_REASON);

    match state.response.block(ip, reason).await? {
        BlockOutcome::Blocked { record, enforced } => Ok((
            StatusCode::CREATED,
            Json(BlockResponse { block: record, enforced, already_blocked: false }),
        )),
        BlockOutcome::AlreadyBlocked(record) => Ok((
            StatusCode::OK,
            Json(BlockResponse { enforced: record.enforced, block: record, already_blocked: true }),
        )),
        BlockOutcome::NotEnforced(e) => Err(AppError::ExternalServiceError(format!(
            "Firewall rejected block of {}: {}",
            ip, e
        ))),
    }
}

/// Lift the active block for an IP
pub async fn delete(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> AppResult<Json<BlockedIp>> {
    let ip = parse_ip(&ip)?;

    let record = state.response
        .unblock(ip)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No active block for {}", ip)))?;

    Ok(Json(record))
}

/// Every block ever recorded for an IP, oldest first
pub async fn history(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> AppResult<Json<Vec<BlockedIp>>> {
    let ip = parse_ip(&ip)?;
    Ok(Json(BlockedIp::history(&state.pool, &ip.to_string()).await?))
}

fn parse_ip(raw: &str) -> AppResult<IpAddr> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::ValidationError("Invalid IP address format".to_string()))
}
