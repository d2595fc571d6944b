use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One hour slot of a forecast: the weather symbol code (e.g.
/// 'partlycloudy_day') and the air temperature in Celsius, one decimal.
#[derive(Debug, Clone)]
pub struct HourSlot {
    pub symbol_name: String,
    pub temperature: BigDecimal,
}

/// Full forecast payload for one coordinate. The seven hour slots cover
/// offsets 0h through 6h from `forecast_start_datetime` and always travel
/// together.
#[derive(Debug, Clone)]
pub struct ForecastSnapshot {
    pub forecast_start_datetime: DateTime<Utc>,
    pub last_forecast_update_datetime: DateTime<Utc>,
    pub new_req_allowed_datetime: DateTime<Utc>,
    pub hours: [HourSlot; 7],
}

/// Outcome of a provider fetch. `NotModified` only occurs for conditional
/// requests and carries whichever refreshed header instants the upstream
/// included in its 304 response.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Snapshot(ForecastSnapshot),
    NotModified {
        new_req_allowed_datetime: Option<DateTime<Utc>>,
        last_forecast_update_datetime: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Error)]
pub enum ForecastProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Fetches the forecast for one coordinate pair. When
    /// `not_modified_since` is given the provider may answer `NotModified`
    /// instead of a full snapshot.
    async fn fetch(
        &self,
        latitude: &BigDecimal,
        longitude: &BigDecimal,
        not_modified_since: Option<DateTime<Utc>>,
    ) -> Result<FetchOutcome, ForecastProviderError>;
}
