/// Tests of the api.met.no client against a stubbed HTTP server, covering
/// the full-snapshot, conditional not-modified, and failure paths.
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mapcast_backend::external::forecast_provider::{
    FetchOutcome, ForecastProvider, ForecastProviderError,
};
use mapcast_backend::external::yr::YrProvider;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn forecast_body() -> serde_json::Value {
    // eight timesteps: the client must use the first seven
    let timeseries: Vec<serde_json::Value> = (0..8)
        .map(|i| {
            json!({
                "time": format!("2021-03-01T{:02}:00:00Z", 10 + i),
                "data": {
                    "instant": {
                        "details": { "air_temperature": 10.55 + i as f64 }
                    },
                    "next_1_hours": {
                        "summary": { "symbol_code": format!("partlycloudy_day_{i}") }
                    }
                }
            })
        })
        .collect();

    json!({
        "properties": {
            "meta": { "updated_at": "2021-03-01T09:30:00Z" },
            "timeseries": timeseries
        }
    })
}

fn provider_for(server: &MockServer) -> YrProvider {
    YrProvider::new(server.uri(), "mapcast-tests".to_string()).unwrap()
}

#[tokio::test]
async fn fetch_parses_full_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("lat", "59.3294"))
        .and(query_param("lon", "18.0686"))
        .and(header("User-Agent", "mapcast-tests"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Expires", "Mon, 01 Mar 2021 10:35:00 GMT")
                .insert_header("Last-Modified", "Mon, 01 Mar 2021 09:30:00 GMT")
                .set_body_json(forecast_body()),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let outcome = provider
        .fetch(&dec("59.3294"), &dec("18.0686"), None)
        .await
        .unwrap();

    let snapshot = match outcome {
        FetchOutcome::Snapshot(snapshot) => snapshot,
        other => panic!("expected a snapshot, got {other:?}"),
    };

    assert_eq!(
        snapshot.forecast_start_datetime,
        Utc.with_ymd_and_hms(2021, 3, 1, 10, 0, 0).unwrap()
    );
    assert_eq!(
        snapshot.last_forecast_update_datetime,
        Utc.with_ymd_and_hms(2021, 3, 1, 9, 30, 0).unwrap()
    );
    assert_eq!(
        snapshot.new_req_allowed_datetime,
        Utc.with_ymd_and_hms(2021, 3, 1, 10, 35, 0).unwrap()
    );

    assert_eq!(snapshot.hours[0].symbol_name, "partlycloudy_day_0");
    assert_eq!(snapshot.hours[6].symbol_name, "partlycloudy_day_6");
    // 10.55 rounds half-to-even at one decimal
    assert_eq!(snapshot.hours[0].temperature, dec("10.6"));
    assert_eq!(snapshot.hours[2].temperature, dec("12.6"));
}

#[tokio::test]
async fn conditional_fetch_maps_304_to_not_modified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("If-Modified-Since", "Mon, 01 Mar 2021 09:30:00 GMT"))
        .respond_with(
            ResponseTemplate::new(304)
                .insert_header("Expires", "Mon, 01 Mar 2021 11:00:00 GMT"),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let since = Utc.with_ymd_and_hms(2021, 3, 1, 9, 30, 0).unwrap();
    let outcome = provider
        .fetch(&dec("59.3294"), &dec("18.0686"), Some(since))
        .await
        .unwrap();

    match outcome {
        FetchOutcome::NotModified {
            new_req_allowed_datetime,
            last_forecast_update_datetime,
        } => {
            assert_eq!(
                new_req_allowed_datetime,
                Some(Utc.with_ymd_and_hms(2021, 3, 1, 11, 0, 0).unwrap())
            );
            assert_eq!(last_forecast_update_datetime, None);
        }
        other => panic!("expected not-modified, got {other:?}"),
    }
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let err = provider
        .fetch(&dec("59.3294"), &dec("18.0686"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ForecastProviderError::RateLimited));
}

#[tokio::test]
async fn server_error_maps_to_bad_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let err = provider
        .fetch(&dec("59.3294"), &dec("18.0686"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ForecastProviderError::BadResponse(_)));
}

#[tokio::test]
async fn short_timeseries_is_rejected() {
    let server = MockServer::start().await;
    let mut body = forecast_body();
    body["properties"]["timeseries"]
        .as_array_mut()
        .unwrap()
        .truncate(3);

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Expires", "Mon, 01 Mar 2021 10:35:00 GMT")
                .set_body_json(body),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let err = provider
        .fetch(&dec("59.3294"), &dec("18.0686"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ForecastProviderError::BadResponse(_)));
}
