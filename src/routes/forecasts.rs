use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::ForecastPointResponse;
use crate::services::coordinates::RawCoordinate;
use crate::services::forecast_sync;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(list_forecasts))
}

/// Accepts a JSON array of `{"lat": .., "lon": ..}` objects and returns the
/// cached (refreshed where needed) forecast for each distinct point. Pairs
/// that collapse under 4-decimal rounding share one entry, so the response
/// may hold fewer points than the request.
pub async fn list_forecasts(
    State(state): State<AppState>,
    Json(coords): Json<Vec<RawCoordinate>>,
) -> Result<Json<Vec<ForecastPointResponse>>, AppError> {
    info!("POST /api/forecasts - Reconciling {} coordinate(s)", coords.len());
    let points = forecast_sync::reconcile(
        &state.store,
        state.forecast_provider.as_ref(),
        &state.sync,
        &coords,
    )
    .await
    .map_err(|e| {
        error!("Failed to reconcile forecast points: {}", e);
        e
    })?;
    Ok(Json(points.into_iter().map(ForecastPointResponse::from).collect()))
}
