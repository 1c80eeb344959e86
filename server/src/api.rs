//! HTTP routing surface.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use ratekeeper_common::{CurrencyRate, CurrencyTimelineRate, CurrencyWithBanStatus, RateError};

use crate::metrics::MetricsSnapshot;
use crate::service::RateService;

/// Shared handler state.
pub type AppState = Arc<RateService>;

/// Error returned by handlers.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub RateError);

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_fault() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            error: self.0.error_code(),
            message: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Count and log a failed request before it is rendered.
fn reject(service: &RateService, err: RateError) -> ApiError {
    let client_fault = err.is_client_fault();
    service.metrics().request_failed(client_fault);
    if client_fault {
        debug!(code = err.error_code(), error = %err, "Request rejected");
    } else {
        error!(code = err.error_code(), error = %err, "Request failed");
    }
    ApiError(err)
}

#[derive(Debug, Deserialize)]
pub struct PairQuery {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub second: String,
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub second: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeBanRequest {
    pub currency: String,
    pub banned: bool,
}

async fn available_currencies(
    State(service): State<AppState>,
) -> ApiResult<Json<Vec<CurrencyWithBanStatus>>> {
    let currencies = service
        .available_currencies()
        .await
        .map_err(|e| reject(&service, e))?;
    Ok(Json(currencies))
}

async fn change_ban(
    State(service): State<AppState>,
    body: Result<Json<ChangeBanRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(request) =
        body.map_err(|e| reject(&service, RateError::InvalidRequest(e.body_text())))?;

    service
        .change_ban_status(&request.currency, request.banned)
        .await
        .map_err(|e| reject(&service, e))?;
    Ok(StatusCode::OK)
}

async fn current_rate(
    State(service): State<AppState>,
    Query(query): Query<PairQuery>,
) -> ApiResult<Json<CurrencyRate>> {
    let rate = service
        .current_rate(&query.base, &query.second)
        .await
        .map_err(|e| reject(&service, e))?;
    Ok(Json(rate))
}

async fn time_series(
    State(service): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<CurrencyTimelineRate>> {
    let timeline = service
        .timeline_rate(&query.base, &query.second, &query.start, &query.end)
        .await
        .map_err(|e| reject(&service, e))?;
    Ok(Json(timeline))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics(State(service): State<AppState>) -> Json<MetricsSnapshot> {
    Json(service.metrics().snapshot())
}

/// Build the application router.
pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/currency/available", get(available_currencies))
        .route("/currency/change-ban", post(change_ban))
        .route("/currency/current-rate", get(current_rate))
        .route("/currency/time-series", get(time_series))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use chrono::NaiveDate;
    use ratekeeper_common::{CurrencyRates, FixedClock, RateDate};
    use ratekeeper_fx::{MockRateCache, MockRateProvider};
    use ratekeeper_store::MockBanStore;
    use std::collections::HashMap;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        service: AppState,
        provider: Arc<MockRateProvider>,
        store: Arc<MockBanStore>,
    }

    fn app() -> TestApp {
        let provider = Arc::new(MockRateProvider::new("test"));
        let store = Arc::new(MockBanStore::new());
        let service = Arc::new(
            RateService::new(Arc::new(MockRateCache::new()), store.clone(), provider.clone())
                .with_clock(Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()))),
        );
        TestApp {
            router: router(service.clone()),
            service,
            provider,
            store,
        }
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_current_rate_ok() {
        let app = app();
        app.provider.set_snapshot(CurrencyRates {
            base: "USD".into(),
            rates: HashMap::from([("EUR".into(), 0.92)]),
            date: RateDate::from_ymd(2024, 1, 31).unwrap(),
        });

        let (status, body) = send(app.router, get("/currency/current-rate?base=USD&second=EUR")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["base"], "USD");
        assert_eq!(body["second"], "EUR");
        assert_eq!(body["rate"], 0.92);
        assert_eq!(body["date"], "2024-01-31");
    }

    #[tokio::test]
    async fn test_invalid_currency_is_bad_request() {
        let app = app();

        let (status, body) = send(app.router, get("/currency/current-rate?base=XXX&second=EUR")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert_eq!(body["error"], "INVALID_CURRENCY");
        assert_eq!(app.service.metrics().snapshot().client_faults, 1);
        assert_eq!(app.provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_parameters_are_bad_request() {
        let app = app();

        let (status, body) = send(app.router, get("/currency/time-series?base=USD&second=EUR")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_DATE");
    }

    #[tokio::test]
    async fn test_provider_failure_is_internal_error() {
        let app = app();

        let (status, body) = send(
            app.router,
            get("/currency/time-series?base=USD&second=EUR&start=2024-01-01&end=2024-01-31"),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "PROVIDER_ERROR");
        assert_eq!(app.service.metrics().snapshot().server_faults, 1);
    }

    #[tokio::test]
    async fn test_change_ban_then_available() {
        let app = app();

        let (status, _) = send(
            app.router.clone(),
            post_json("/currency/change-ban", r#"{"currency":"GBP","banned":true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.store.stored("GBP"), Some(true));

        let (status, body) = send(app.router, get("/currency/available")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["currency"], "GBP");
        assert_eq!(body[0]["banned"], true);
        assert_eq!(body[1]["banned"], false);
    }

    #[tokio::test]
    async fn test_malformed_change_ban_body() {
        let app = app();

        let (status, body) = send(
            app.router,
            post_json("/currency/change-ban", r#"{"currency":"GBP"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_REQUEST");
        assert_eq!(app.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = app();

        let (status, body) = send(app.router.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(app.router, get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cacheHits"], 0);
    }
}
