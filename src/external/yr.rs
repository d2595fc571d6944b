use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::rounding::RoundingMode;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use reqwest::{header, StatusCode};
use serde::Deserialize;

use crate::external::forecast_provider::{
    FetchOutcome, ForecastProvider, ForecastProviderError, ForecastSnapshot, HourSlot,
};

pub const YR_API_ENDPOINT: &str =
    "https://api.met.no/weatherapi/locationforecast/2.0/compact";

// api.met.no rejects anonymous clients, so some identifying agent string is
// always sent even when FORECAST_USER_AGENT is unset.
const DEFAULT_USER_AGENT: &str = "mapcast-backend (+https://github.com/mapcast/mapcast-backend)";

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub struct YrProvider {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
}

impl YrProvider {
    pub fn from_env() -> Result<Self, ForecastProviderError> {
        let user_agent = std::env::var("FORECAST_USER_AGENT")
            .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
        Self::new(YR_API_ENDPOINT.to_string(), user_agent)
    }

    pub fn new(endpoint: String, user_agent: String) -> Result<Self, ForecastProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ForecastProviderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            user_agent,
        })
    }
}

#[derive(Debug, Deserialize)]
struct YrResponse {
    properties: YrProperties,
}

#[derive(Debug, Deserialize)]
struct YrProperties {
    meta: YrMeta,
    timeseries: Vec<YrTimestep>,
}

#[derive(Debug, Deserialize)]
struct YrMeta {
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct YrTimestep {
    time: String,
    data: YrStepData,
}

#[derive(Debug, Deserialize)]
struct YrStepData {
    instant: YrInstant,
    // absent on timesteps past the hourly horizon
    next_1_hours: Option<YrNextHour>,
}

#[derive(Debug, Deserialize)]
struct YrInstant {
    details: YrInstantDetails,
}

#[derive(Debug, Deserialize)]
struct YrInstantDetails {
    air_temperature: serde_json::Number,
}

#[derive(Debug, Deserialize)]
struct YrNextHour {
    summary: YrSummary,
}

#[derive(Debug, Deserialize)]
struct YrSummary {
    symbol_code: String,
}

#[async_trait]
impl ForecastProvider for YrProvider {
    async fn fetch(
        &self,
        latitude: &BigDecimal,
        longitude: &BigDecimal,
        not_modified_since: Option<DateTime<Utc>>,
    ) -> Result<FetchOutcome, ForecastProviderError> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
            ])
            .header(header::USER_AGENT, self.user_agent.as_str());

        if let Some(since) = not_modified_since {
            request = request.header(
                header::IF_MODIFIED_SINCE,
                since.format(HTTP_DATE_FORMAT).to_string(),
            );
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ForecastProviderError::Network(e.to_string()))?;

        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified {
                new_req_allowed_datetime: parse_header_date(resp.headers().get(header::EXPIRES)),
                last_forecast_update_datetime: parse_header_date(
                    resp.headers().get(header::LAST_MODIFIED),
                ),
            });
        }

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ForecastProviderError::RateLimited);
        }

        if !resp.status().is_success() {
            return Err(ForecastProviderError::BadResponse(format!(
                "unexpected status {}",
                resp.status()
            )));
        }

        // the Expires header carries the rate-limit window; read it before
        // the body consumes the response
        let expires = parse_header_date(resp.headers().get(header::EXPIRES)).ok_or_else(|| {
            ForecastProviderError::Parse("missing or invalid Expires header".into())
        })?;

        let body: YrResponse = resp
            .json()
            .await
            .map_err(|e| ForecastProviderError::Parse(e.to_string()))?;

        snapshot_from_body(body, expires)
    }
}

fn snapshot_from_body(
    body: YrResponse,
    expires: DateTime<Utc>,
) -> Result<FetchOutcome, ForecastProviderError> {
    let updated_at = parse_rfc3339(&body.properties.meta.updated_at)?;

    let steps = body.properties.timeseries;
    if steps.len() < 7 {
        return Err(ForecastProviderError::BadResponse(format!(
            "expected at least 7 hourly timesteps, got {}",
            steps.len()
        )));
    }

    let forecast_start = parse_rfc3339(&steps[0].time)?;

    let mut hours = Vec::with_capacity(7);
    for step in steps.into_iter().take(7) {
        let next_hour = step.data.next_1_hours.ok_or_else(|| {
            ForecastProviderError::BadResponse("timestep is missing next_1_hours data".into())
        })?;
        let temperature =
            BigDecimal::from_str(&step.data.instant.details.air_temperature.to_string())
                .map_err(|e| ForecastProviderError::Parse(e.to_string()))?
                .with_scale_round(1, RoundingMode::HalfEven);
        hours.push(HourSlot {
            symbol_name: next_hour.summary.symbol_code,
            temperature,
        });
    }

    let hours: [HourSlot; 7] = hours
        .try_into()
        .map_err(|_| ForecastProviderError::BadResponse("expected 7 hourly timesteps".into()))?;

    Ok(FetchOutcome::Snapshot(ForecastSnapshot {
        forecast_start_datetime: forecast_start,
        last_forecast_update_datetime: updated_at,
        new_req_allowed_datetime: expires,
        hours,
    }))
}

fn parse_header_date(value: Option<&header::HeaderValue>) -> Option<DateTime<Utc>> {
    let text = value?.to_str().ok()?;
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_rfc3339(text: &str) -> Result<DateTime<Utc>, ForecastProviderError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ForecastProviderError::Parse(format!("bad timestamp '{text}': {e}")))
}
