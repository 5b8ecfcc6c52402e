//! Alert handlers

use axum::{extract::{State, Path, Query}, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::logic::correlation;
use crate::models::{Alert, AlertFilter, UpdateAlertStatus};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// Alert plus its noise classification
#[derive(Debug, Serialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: Alert,
    pub is_noise: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct RelatedQuery {
    pub window_minutes: Option<i64>,
    pub limit: Option<i64>,
}

/// List alerts, newest first. Noise is hidden unless `hide_noise=false`.
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> AppResult<Json<Vec<AlertView>>> {
    let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let hide_noise = filter.hide_noise.unwrap_or(true);

    // Over-fetch so filtering noise still fills the page
    let batch = limit * 2;
    let mut offset = 0;
    let mut views = Vec::new();

    'pages: loop {
        let page = Alert::list_page(&state.pool, &filter, batch, offset).await?;
        let fetched = page.len() as i64;

        for alert in page {
            let is_noise = state.noise.is_noise(&alert);
            if hide_noise && is_noise {
                continue;
            }
            views.push(AlertView { alert, is_noise });
            if views.len() as i64 >= limit {
                break 'pages;
            }
        }

        if fetched < batch {
            break;
        }
        offset += batch;
    }

    Ok(Json(views))
}

/// Single alert, enriched on demand
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AlertView>> {
    let alert = find(&state, id).await?;
    let alert = state.enricher.enrich(alert).await?;
    let is_noise = state.noise.is_noise(&alert);

    Ok(Json(AlertView { alert, is_noise }))
}

/// Alerts sharing an address within the time window
pub async fn related(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RelatedQuery>,
) -> AppResult<Json<Vec<Alert>>> {
    let window = query.window_minutes.unwrap_or(correlation::DEFAULT_WINDOW_MINUTES);
    let limit = query.limit.unwrap_or(correlation::DEFAULT_LIMIT);
    if window <= 0 || limit <= 0 {
        return Err(AppError::ValidationError(
            "window_minutes and limit must be positive".to_string(),
        ));
    }

    let alert = find(&state, id).await?;
    let related = correlation::related_and_record(
        &state.pool,
        &alert,
        chrono::Duration::minutes(window),
        limit.min(MAX_LIMIT),
    )
    .await?;

    Ok(Json(related))
}

/// Update investigation status and notes
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAlertStatus>,
) -> AppResult<Json<Alert>> {
    req.validate()?;

    let alert = Alert::update_status(&state.pool, id, req.status, req.notes.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))?;

    tracing::info!("Alert {} marked {}", id, alert.status);
    Ok(Json(alert))
}

async fn find(state: &AppState, id: i64) -> AppResult<Alert> {
    Alert::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))
}
