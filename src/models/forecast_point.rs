use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::external::forecast_provider::ForecastSnapshot;
use crate::services::coordinates::{Coordinate, COORDINATE_SCALE};

// Hourly forecast data older than this (relative to the 0h slot) no longer
// represents "now" and makes the point eligible for a refresh.
const STALE_AFTER_SECONDS: i64 = 1800;

/// Cached weather forecast for one geographical point.
///
/// There is at most one row per 4-decimal (latitude, longitude) pair. The
/// seven hour slots and the three timestamps are only ever written together;
/// rows are created from a successful upstream fetch and never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ForecastPoint {
    pub id: Uuid,

    pub latitude: BigDecimal,
    pub longitude: BigDecimal,

    // instant (UTC) the 0h slot applies to
    pub forecast_start_datetime: DateTime<Utc>,
    // instant the upstream last refreshed this forecast ('Last-Modified')
    pub last_forecast_update_datetime: DateTime<Utc>,
    // instant before which the upstream forbids a re-request ('Expires')
    pub new_req_allowed_datetime: DateTime<Utc>,

    pub symbol_name_0h: String,
    pub t_0h: BigDecimal,
    pub symbol_name_1h: String,
    pub t_1h: BigDecimal,
    pub symbol_name_2h: String,
    pub t_2h: BigDecimal,
    pub symbol_name_3h: String,
    pub t_3h: BigDecimal,
    pub symbol_name_4h: String,
    pub t_4h: BigDecimal,
    pub symbol_name_5h: String,
    pub t_5h: BigDecimal,
    pub symbol_name_6h: String,
    pub t_6h: BigDecimal,
}

impl ForecastPoint {
    pub fn from_snapshot(coordinate: Coordinate, snapshot: ForecastSnapshot) -> Self {
        let [h0, h1, h2, h3, h4, h5, h6] = snapshot.hours;
        Self {
            id: Uuid::new_v4(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            forecast_start_datetime: snapshot.forecast_start_datetime,
            last_forecast_update_datetime: snapshot.last_forecast_update_datetime,
            new_req_allowed_datetime: snapshot.new_req_allowed_datetime,
            symbol_name_0h: h0.symbol_name,
            t_0h: h0.temperature,
            symbol_name_1h: h1.symbol_name,
            t_1h: h1.temperature,
            symbol_name_2h: h2.symbol_name,
            t_2h: h2.temperature,
            symbol_name_3h: h3.symbol_name,
            t_3h: h3.temperature,
            symbol_name_4h: h4.symbol_name,
            t_4h: h4.temperature,
            symbol_name_5h: h5.symbol_name,
            t_5h: h5.temperature,
            symbol_name_6h: h6.symbol_name,
            t_6h: h6.temperature,
        }
    }

    /// Replaces every hour slot and all three timestamps together. A point
    /// is never left holding a mix of old and new forecast data.
    pub fn apply_snapshot(&mut self, snapshot: ForecastSnapshot) {
        let [h0, h1, h2, h3, h4, h5, h6] = snapshot.hours;
        self.forecast_start_datetime = snapshot.forecast_start_datetime;
        self.last_forecast_update_datetime = snapshot.last_forecast_update_datetime;
        self.new_req_allowed_datetime = snapshot.new_req_allowed_datetime;
        self.symbol_name_0h = h0.symbol_name;
        self.t_0h = h0.temperature;
        self.symbol_name_1h = h1.symbol_name;
        self.t_1h = h1.temperature;
        self.symbol_name_2h = h2.symbol_name;
        self.t_2h = h2.temperature;
        self.symbol_name_3h = h3.symbol_name;
        self.t_3h = h3.temperature;
        self.symbol_name_4h = h4.symbol_name;
        self.t_4h = h4.temperature;
        self.symbol_name_5h = h5.symbol_name;
        self.t_5h = h5.temperature;
        self.symbol_name_6h = h6.symbol_name;
        self.t_6h = h6.temperature;
    }

    /// Same canonical key as [`Coordinate::key`], for matching rows against
    /// requested coordinates.
    pub fn coordinate_key(&self) -> (String, String) {
        (
            self.latitude.with_scale(COORDINATE_SCALE).to_string(),
            self.longitude.with_scale(COORDINATE_SCALE).to_string(),
        )
    }

    /// Whether this point needs a refresh: its 0h data is more than 30
    /// minutes old _and_ the upstream's rate-limit window has passed. A
    /// logically stale point inside the window is left alone.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let since_start = now - self.forecast_start_datetime;
        since_start.num_seconds() > STALE_AFTER_SECONDS && now >= self.new_req_allowed_datetime
    }
}

/// Wire shape for the forecast endpoint: forecast content plus the
/// coordinate, without the rate-limit bookkeeping.
#[derive(Debug, Serialize)]
pub struct ForecastPointResponse {
    pub forecast_start_datetime: DateTime<Utc>,
    pub latitude: BigDecimal,
    pub longitude: BigDecimal,
    pub symbol_name_0h: String,
    pub t_0h: BigDecimal,
    pub symbol_name_1h: String,
    pub t_1h: BigDecimal,
    pub symbol_name_2h: String,
    pub t_2h: BigDecimal,
    pub symbol_name_3h: String,
    pub t_3h: BigDecimal,
    pub symbol_name_4h: String,
    pub t_4h: BigDecimal,
    pub symbol_name_5h: String,
    pub t_5h: BigDecimal,
    pub symbol_name_6h: String,
    pub t_6h: BigDecimal,
}

impl From<ForecastPoint> for ForecastPointResponse {
    fn from(point: ForecastPoint) -> Self {
        Self {
            forecast_start_datetime: point.forecast_start_datetime,
            latitude: point.latitude,
            longitude: point.longitude,
            symbol_name_0h: point.symbol_name_0h,
            t_0h: point.t_0h,
            symbol_name_1h: point.symbol_name_1h,
            t_1h: point.t_1h,
            symbol_name_2h: point.symbol_name_2h,
            t_2h: point.t_2h,
            symbol_name_3h: point.symbol_name_3h,
            t_3h: point.t_3h,
            symbol_name_4h: point.symbol_name_4h,
            t_4h: point.t_4h,
            symbol_name_5h: point.symbol_name_5h,
            t_5h: point.t_5h,
            symbol_name_6h: point.symbol_name_6h,
            t_6h: point.t_6h,
        }
    }
}
