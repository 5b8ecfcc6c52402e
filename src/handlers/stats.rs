//! Statistics handlers

use axum::{extract::{State, Query}, Json};
use serde::Deserialize;

use crate::{AppState, AppResult};
use crate::logic::stats::{self, AlertStatistics, NoiseSummary, StatsOptions};

#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    pub hours: Option<i64>,
    pub hide_noise: Option<bool>,
    pub top: Option<usize>,
}

/// Dashboard statistics over the last `hours` (default 24)
pub async fn overview(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<AlertStatistics>> {
    let defaults = StatsOptions::default();
    let options = StatsOptions {
        hours: query.hours.unwrap_or(defaults.hours).clamp(1, 24 * 365),
        hide_noise: query.hide_noise.unwrap_or(defaults.hide_noise),
        top: query.top.unwrap_or(defaults.top).clamp(1, 100),
    };

    let statistics = stats::collect(&state.pool, &state.noise, state.enricher.mapper(), &options).await?;
    Ok(Json(statistics))
}

/// True threats vs noise across all stored alerts
pub async fn noise(State(state): State<AppState>) -> AppResult<Json<NoiseSummary>> {
    Ok(Json(stats::noise_summary(&state.pool, &state.noise).await?))
}
