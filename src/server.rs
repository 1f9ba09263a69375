//! ==============================================================================
//! server.rs - http surface
//! ==============================================================================
//!
//! routes:
//!
//!     POST /temperature_humidity_data   {temperature, humidity}  (climate device)
//!     POST /mq6_data                    {mq6_reading}            (gas device)
//!     GET  /aht21_temperature_data      [[ts, value], ...] newest first
//!     GET  /aht21_humidity_data         "
//!     GET  /mq6_data                    "
//!     GET  /esp32_status                {device: "online" | "offline"}
//!     GET  /plot_mq6, /plot_aht21, /overall   png, oldest first
//!     GET  /, /aht21, /mq6              dashboard pages
//!
//! listings are newest-first while plots are oldest-first. that is what the
//! dashboards were built against, so it stays.
//!
//! relationships:
//!     - uses: store/ (reads + writes), liveness.rs (record_seen, snapshot)
//!     - uses: chart.rs (png rendering, on spawn_blocking), pages.rs
//!
//! ==============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::chart::{self, Panel};
use crate::domain::{ClimatePayload, DeviceStatus, GasPayload, Metric, Reading, SortOrder};
use crate::error::AppError;
use crate::liveness::LivenessTracker;
use crate::pages;
use crate::store::ReadingStore;

// ==============================================================================
// shared state
// ==============================================================================
// cheap to clone: the store and the tracker are both behind an Arc

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub tracker: LivenessTracker,
    /// device id behind /temperature_humidity_data
    pub climate_device: String,
    /// device id behind /mq6_data
    pub gas_device: String,
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/aht21", get(aht21_page))
        .route("/mq6", get(mq6_page))
        .route("/temperature_humidity_data", post(ingest_climate))
        .route("/mq6_data", get(list_mq6).post(ingest_gas))
        .route("/aht21_temperature_data", get(list_temperature))
        .route("/aht21_humidity_data", get(list_humidity))
        .route("/esp32_status", get(device_status))
        .route("/plot_mq6", get(plot_mq6))
        .route("/plot_aht21", get(plot_aht21))
        .route("/overall", get(plot_overall))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// parse a json body, reporting any problem as a validation error
/// (axum's own Json extractor would answer 422)
fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::Validation(e.to_string()))
}

// ==============================================================================
// ingest
// ==============================================================================

async fn ingest_climate(State(state): State<AppState>, body: Bytes) -> Result<&'static str, AppError> {
    let payload: ClimatePayload = parse_payload(&body)?;
    tracing::debug!(?payload, "received temperature and humidity data");

    // the device reached us, whatever happens to the write
    let timestamp = Utc::now();
    state.tracker.record_seen_at(&state.climate_device, timestamp);

    state
        .store
        .insert(
            timestamp,
            &[
                (Metric::Temperature, payload.temperature),
                (Metric::Humidity, payload.humidity),
            ],
        )
        .await?;

    Ok("Temperature and humidity data received successfully")
}

async fn ingest_gas(State(state): State<AppState>, body: Bytes) -> Result<&'static str, AppError> {
    let payload: GasPayload = parse_payload(&body)?;
    tracing::debug!(?payload, "received mq6 data");

    let timestamp = Utc::now();
    state.tracker.record_seen_at(&state.gas_device, timestamp);

    state
        .store
        .insert(timestamp, &[(Metric::Mq6, payload.mq6_reading)])
        .await?;

    Ok("MQ6 data received successfully")
}

// ==============================================================================
// listings + status
// ==============================================================================

async fn listing(state: &AppState, metric: Metric) -> Result<Json<Vec<Reading>>, AppError> {
    let rows = state.store.series(metric, SortOrder::Descending).await?;
    tracing::debug!(table = metric.table(), rows = rows.len(), "fetched series");
    Ok(Json(rows))
}

async fn list_temperature(State(state): State<AppState>) -> Result<Json<Vec<Reading>>, AppError> {
    listing(&state, Metric::Temperature).await
}

async fn list_humidity(State(state): State<AppState>) -> Result<Json<Vec<Reading>>, AppError> {
    listing(&state, Metric::Humidity).await
}

async fn list_mq6(State(state): State<AppState>) -> Result<Json<Vec<Reading>>, AppError> {
    listing(&state, Metric::Mq6).await
}

async fn device_status(State(state): State<AppState>) -> Json<BTreeMap<String, DeviceStatus>> {
    Json(state.tracker.snapshot(Utc::now()))
}

// ==============================================================================
// charts
// ==============================================================================

async fn plot(
    state: &AppState,
    metrics: &[Metric],
    width: u32,
    height: u32,
) -> Result<Response, AppError> {
    let mut panels = Vec::with_capacity(metrics.len());
    for &metric in metrics {
        let readings = state.store.series(metric, SortOrder::Ascending).await?;
        panels.push(Panel::new(metric, readings));
    }

    let png = tokio::task::spawn_blocking(move || chart::render_png(&panels, width, height))
        .await
        .map_err(|e| AppError::Render(format!("render task failed: {e}")))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn plot_mq6(State(state): State<AppState>) -> Result<Response, AppError> {
    plot(&state, &[Metric::Mq6], 1000, 600).await
}

async fn plot_aht21(State(state): State<AppState>) -> Result<Response, AppError> {
    plot(&state, &[Metric::Temperature, Metric::Humidity], 1000, 1200).await
}

async fn plot_overall(State(state): State<AppState>) -> Result<Response, AppError> {
    plot(&state, &[Metric::Mq6, Metric::Temperature, Metric::Humidity], 1800, 1800).await
}

// ==============================================================================
// pages
// ==============================================================================

async fn index_page(State(state): State<AppState>) -> Html<String> {
    let devices: Vec<&str> = state.tracker.devices().collect();
    Html(pages::index(&devices))
}

async fn aht21_page() -> Html<String> {
    Html(pages::aht21())
}

async fn mq6_page() -> Html<String> {
    Html(pages::mq6())
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::ByteSize;
    use crate::store::{MemoryStore, PurgeCounts};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::DateTime;
    use tower::ServiceExt;

    fn state_with(store: Arc<dyn ReadingStore>) -> AppState {
        AppState {
            store,
            tracker: LivenessTracker::new(["esp32_1", "esp32_2"], chrono::Duration::seconds(60)),
            climate_device: "esp32_1".to_string(),
            gas_device: "esp32_2".to_string(),
        }
    }

    fn app(state: AppState) -> Router {
        router(state, Duration::from_secs(5))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(resp: Response) -> Bytes {
        axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn climate_ingest_writes_both_series_with_one_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let before = Utc::now();
        let resp = app(state.clone())
            .oneshot(post_json("/temperature_humidity_data", r#"{"temperature": 22.5, "humidity": 60}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let temps = store.series(Metric::Temperature, SortOrder::Ascending).await.unwrap();
        let hums = store.series(Metric::Humidity, SortOrder::Ascending).await.unwrap();
        assert_eq!(temps.len(), 1);
        assert_eq!(hums.len(), 1);
        assert_eq!(temps[0].value, 22.5);
        assert_eq!(hums[0].value, 60.0);
        assert_eq!(temps[0].timestamp, hums[0].timestamp);
        assert!(temps[0].timestamp >= before);

        let t0 = temps[0].timestamp;
        assert_eq!(state.tracker.last_seen("esp32_1"), Some(t0));
        assert_eq!(
            state.tracker.status("esp32_1", t0 + chrono::Duration::seconds(59)),
            Some(DeviceStatus::Online)
        );
        assert_eq!(
            state.tracker.status("esp32_1", t0 + chrono::Duration::seconds(60)),
            Some(DeviceStatus::Offline)
        );
        assert_eq!(state.tracker.status("esp32_2", t0), Some(DeviceStatus::Offline));
    }

    #[tokio::test]
    async fn gas_ingest_marks_gas_device() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let resp = app(state.clone())
            .oneshot(post_json("/mq6_data", r#"{"mq6_reading": 412}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&body_bytes(resp).await[..], b"MQ6 data received successfully");
        assert_eq!(store.len(Metric::Mq6), 1);
        assert!(state.tracker.last_seen("esp32_2").is_some());
        assert!(state.tracker.last_seen("esp32_1").is_none());
    }

    #[tokio::test]
    async fn malformed_payloads_are_rejected_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        for (uri, body) in [
            ("/temperature_humidity_data", r#"{"temperature": 22.5}"#),
            ("/temperature_humidity_data", r#"{"temperature": "hot", "humidity": 1}"#),
            ("/temperature_humidity_data", "not json"),
            ("/mq6_data", r#"{}"#),
            ("/mq6_data", ""),
        ] {
            let resp = app(state.clone()).oneshot(post_json(uri, body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri} {body}");
        }

        for metric in Metric::ALL {
            assert_eq!(store.len(metric), 0);
        }
        assert_eq!(state.tracker.last_seen("esp32_1"), None);
        assert_eq!(state.tracker.last_seen("esp32_2"), None);
    }

    #[tokio::test]
    async fn listings_are_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let t0 = Utc::now() - chrono::Duration::hours(1);
        for i in 0..3 {
            store
                .insert(t0 + chrono::Duration::minutes(i), &[(Metric::Temperature, i as f64)])
                .await
                .unwrap();
        }

        let resp = app(state_with(store))
            .oneshot(get_req("/aht21_temperature_data"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let rows: Vec<(DateTime<Utc>, f64)> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(rows.iter().map(|r| r.1).collect::<Vec<_>>(), vec![2.0, 1.0, 0.0]);
        assert!(rows[0].0 > rows[2].0);
    }

    #[tokio::test]
    async fn status_reports_every_known_device() {
        let state = state_with(Arc::new(MemoryStore::new()));
        state.tracker.record_seen("esp32_2");

        let resp = app(state).oneshot(get_req("/esp32_status")).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, serde_json::json!({"esp32_1": "offline", "esp32_2": "online"}));
    }

    #[tokio::test]
    async fn plots_are_png() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .insert(now, &[(Metric::Temperature, 21.0), (Metric::Humidity, 40.0)])
            .await
            .unwrap();
        store.insert(now, &[(Metric::Mq6, 300.0)]).await.unwrap();
        let state = state_with(store);

        for uri in ["/plot_mq6", "/plot_aht21", "/overall"] {
            let resp = app(state.clone()).oneshot(get_req(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
            assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
            assert_eq!(&body_bytes(resp).await[..8], &chart::PNG_SIGNATURE);
        }
    }

    #[tokio::test]
    async fn pages_render() {
        let state = state_with(Arc::new(MemoryStore::new()));
        for uri in ["/", "/aht21", "/mq6"] {
            let resp = app(state.clone()).oneshot(get_req(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        }
    }

    struct DownStore;

    #[async_trait]
    impl ReadingStore for DownStore {
        async fn ensure_schema(&self) -> Result<(), AppError> {
            Err(AppError::Connection("refused".into()))
        }
        async fn insert(&self, _: DateTime<Utc>, _: &[(Metric, f64)]) -> Result<(), AppError> {
            Err(AppError::Connection("refused".into()))
        }
        async fn series(&self, _: Metric, _: SortOrder) -> Result<Vec<Reading>, AppError> {
            Err(AppError::Storage("relation does not exist".into()))
        }
        async fn current_size(&self) -> Result<ByteSize, AppError> {
            Err(AppError::Connection("refused".into()))
        }
        async fn purge_older_than(&self, _: DateTime<Utc>) -> Result<PurgeCounts, AppError> {
            Err(AppError::Connection("refused".into()))
        }
    }

    #[tokio::test]
    async fn storage_failures_are_500() {
        let state = state_with(Arc::new(DownStore));

        let resp = app(state.clone())
            .oneshot(post_json("/mq6_data", r#"{"mq6_reading": 1}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        for uri in ["/mq6_data", "/aht21_humidity_data", "/overall"] {
            let resp = app(state.clone()).oneshot(get_req(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        }
    }
}
