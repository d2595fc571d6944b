use std::collections::HashSet;
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::db::forecast_store::{ForecastStore, StoreError};
use crate::errors::AppError;
use crate::external::forecast_provider::{FetchOutcome, ForecastProvider, ForecastProviderError};
use crate::models::ForecastPoint;
use crate::services::coordinates::{self, Coordinate, RawCoordinate};

/// Tuning knobs for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on any single upstream fetch. A fetch that exceeds it is
    /// treated the same as an unavailable upstream.
    pub fetch_timeout: Duration,
    /// How many upstream fetches may be in flight at once.
    pub max_concurrent_fetches: usize,
    /// On a 304 response, advance the record's Expires/Last-Modified
    /// bookkeeping without touching forecast content. When false the record
    /// is left entirely untouched, rate-limit window included.
    pub advance_on_not_modified: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 4,
            advance_on_not_modified: true,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fetch_timeout: std::env::var("SYNC_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            max_concurrent_fetches: std::env::var("SYNC_MAX_CONCURRENT_FETCHES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_concurrent_fetches),
            advance_on_not_modified: std::env::var("SYNC_ADVANCE_ON_NOT_MODIFIED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.advance_on_not_modified),
        }
    }
}

/// Turns a batch of requested coordinates into an up-to-date set of cached
/// forecast points.
///
/// Coordinates are rounded to 4 decimals and deduplicated, so the result may
/// hold fewer points than the request. Per-coordinate upstream failures leave
/// that point stale (if it exists) or absent (if it does not); only malformed
/// input or a failed batch lookup fail the call as a whole. Result order is
/// stable but unrelated to request order.
pub async fn reconcile(
    store: &dyn ForecastStore,
    provider: &dyn ForecastProvider,
    config: &SyncConfig,
    raw_coords: &[RawCoordinate],
) -> Result<Vec<ForecastPoint>, AppError> {
    if raw_coords.is_empty() {
        return Ok(Vec::new());
    }

    let coords = coordinates::dedup(coordinates::normalize(raw_coords)?);

    let existing = store.find_by_coordinates(&coords).await?;
    let found_keys: HashSet<(String, String)> =
        existing.iter().map(|p| p.coordinate_key()).collect();
    let missing: Vec<Coordinate> = coords
        .iter()
        .filter(|c| !found_keys.contains(&c.key()))
        .cloned()
        .collect();

    // one staleness decision instant for the whole batch
    let now = Utc::now();
    let (stale, fresh): (Vec<_>, Vec<_>) = existing.into_iter().partition(|p| p.is_stale(now));

    if !stale.is_empty() || !missing.is_empty() {
        info!(
            "syncing forecast points: {} stale to refresh, {} missing to create",
            stale.len(),
            missing.len()
        );
    }

    let parallelism = config.max_concurrent_fetches.max(1);

    let refreshed: Vec<ForecastPoint> = stream::iter(
        stale
            .into_iter()
            .map(|point| refresh_point(store, provider, config, point)),
    )
    .buffer_unordered(parallelism)
    .collect()
    .await;

    let created: Vec<Option<ForecastPoint>> = stream::iter(
        missing
            .into_iter()
            .map(|coord| create_point(store, provider, config, coord)),
    )
    .buffer_unordered(parallelism)
    .collect()
    .await;

    let mut points = fresh;
    points.extend(refreshed);
    points.extend(created.into_iter().flatten());
    Ok(points)
}

/// Refreshes one stale point via a conditional fetch. Always hands back a
/// point: on any failure the caller gets the last successfully synced state.
async fn refresh_point(
    store: &dyn ForecastStore,
    provider: &dyn ForecastProvider,
    config: &SyncConfig,
    point: ForecastPoint,
) -> ForecastPoint {
    let outcome = fetch_bounded(
        provider,
        config,
        &point.latitude,
        &point.longitude,
        Some(point.last_forecast_update_datetime),
    )
    .await;

    match outcome {
        Ok(FetchOutcome::Snapshot(snapshot)) => {
            let mut updated = point.clone();
            updated.apply_snapshot(snapshot);
            persist_update(store, updated, point).await
        }
        Ok(FetchOutcome::NotModified {
            new_req_allowed_datetime,
            last_forecast_update_datetime,
        }) => {
            if !config.advance_on_not_modified {
                return point;
            }
            let mut updated = point.clone();
            if let Some(expires) = new_req_allowed_datetime {
                updated.new_req_allowed_datetime = expires;
            }
            if let Some(modified) = last_forecast_update_datetime {
                updated.last_forecast_update_datetime = modified;
            }
            persist_update(store, updated, point).await
        }
        Err(e) => {
            warn!(
                "leaving forecast point ({}, {}) stale: {}",
                point.latitude, point.longitude, e
            );
            point
        }
    }
}

async fn persist_update(
    store: &dyn ForecastStore,
    updated: ForecastPoint,
    previous: ForecastPoint,
) -> ForecastPoint {
    match store.update(&updated).await {
        Ok(()) => updated,
        Err(e) => {
            warn!(
                "failed to persist refreshed forecast for ({}, {}): {}",
                previous.latitude, previous.longitude, e
            );
            previous
        }
    }
}

/// Fetches and inserts a point for a coordinate with no cache row yet.
/// Returns `None` when the coordinate has to be skipped this round.
async fn create_point(
    store: &dyn ForecastStore,
    provider: &dyn ForecastProvider,
    config: &SyncConfig,
    coord: Coordinate,
) -> Option<ForecastPoint> {
    let outcome = fetch_bounded(provider, config, &coord.latitude, &coord.longitude, None).await;

    let snapshot = match outcome {
        Ok(FetchOutcome::Snapshot(snapshot)) => snapshot,
        Ok(FetchOutcome::NotModified { .. }) => {
            warn!(
                "upstream returned not-modified for an unconditional request at ({}, {})",
                coord.latitude, coord.longitude
            );
            return None;
        }
        Err(e) => {
            warn!(
                "skipping forecast creation for ({}, {}): {}",
                coord.latitude, coord.longitude, e
            );
            return None;
        }
    };

    let point = ForecastPoint::from_snapshot(coord.clone(), snapshot);
    match store.create(&point).await {
        Ok(created) => Some(created),
        Err(StoreError::Duplicate) => {
            // lost a create race against a concurrent reconciliation; the
            // row exists now, so serve that one
            match store
                .find_by_coordinates(std::slice::from_ref(&coord))
                .await
            {
                Ok(mut points) if !points.is_empty() => Some(points.remove(0)),
                Ok(_) => {
                    warn!(
                        "duplicate insert for ({}, {}) but no row found on re-read",
                        coord.latitude, coord.longitude
                    );
                    None
                }
                Err(e) => {
                    warn!(
                        "failed to re-read forecast point ({}, {}) after duplicate insert: {}",
                        coord.latitude, coord.longitude, e
                    );
                    None
                }
            }
        }
        Err(e) => {
            warn!(
                "failed to persist new forecast for ({}, {}): {}",
                coord.latitude, coord.longitude, e
            );
            None
        }
    }
}

async fn fetch_bounded(
    provider: &dyn ForecastProvider,
    config: &SyncConfig,
    latitude: &BigDecimal,
    longitude: &BigDecimal,
    not_modified_since: Option<DateTime<Utc>>,
) -> Result<FetchOutcome, ForecastProviderError> {
    match timeout(
        config.fetch_timeout,
        provider.fetch(latitude, longitude, not_modified_since),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ForecastProviderError::Network(format!(
            "fetch timed out after {:?}",
            config.fetch_timeout
        ))),
    }
}
