//! End-to-end checks against a running server.
//!
//! Start the service first (for example `SEED_DEMO_DATA=true`), then run
//! `cargo test -- --ignored`. `BASE_URL` defaults to `http://localhost:8080`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio_test::assert_ok;

#[derive(Debug, Deserialize)]
struct Reading {
    city: String,
    pm25: Option<f64>,
    aqi: i32,
    category: String,
    color: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    readings: Vec<Reading>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    city: String,
    readings: Vec<Reading>,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

#[tokio::test]
#[ignore = "requires a running server at BASE_URL"]
async fn latest_is_sorted_and_scored() -> Result<()> {
    // ---
    let url = format!("{}/api/latest", base_url());
    let latest: LatestResponse = Client::new().get(&url).send().await?.json().await?;

    for pair in latest.readings.windows(2) {
        assert!(
            pair[0].aqi >= pair[1].aqi,
            "{} ({}) listed before {} ({})",
            pair[0].city,
            pair[0].aqi,
            pair[1].city,
            pair[1].aqi
        );
    }
    for r in &latest.readings {
        assert!(!r.category.is_empty());
        assert!(r.color.starts_with('#'), "color for {} is {}", r.city, r.color);
        assert!(r.timestamp > DateTime::from_timestamp(0, 0).unwrap());
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server at BASE_URL"]
async fn ingest_round_trips_through_history() -> Result<()> {
    // ---
    let base = base_url();
    let client = Client::new();
    let city = format!("IntegrationTown-{}", Utc::now().timestamp_millis());

    let resp = client
        .post(format!("{base}/api/ingest"))
        .json(&json!({ "city": city, "pm25": 35.4, "pm10": 20.0 }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let history: HistoryResponse = assert_ok!(
        client
            .get(format!("{base}/api/history"))
            .query(&[("city", city.as_str()), ("limit", "5")])
            .send()
            .await?
            .json::<HistoryResponse>()
            .await
    );

    assert_eq!(history.city, city);
    assert_eq!(history.readings.len(), 1);
    assert_eq!(history.readings[0].pm25, Some(35.4));
    assert_eq!(history.readings[0].aqi, 100);
    assert_eq!(history.readings[0].category, "Moderate");

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running server at BASE_URL"]
async fn history_without_city_is_rejected() -> Result<()> {
    // ---
    let resp = Client::new().get(format!("{}/api/history", base_url())).send().await?;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
