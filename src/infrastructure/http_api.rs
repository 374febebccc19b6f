//! HTTP surface
//!
//! Every route sits behind a global request rate limit and a static bearer
//! token check. Sync runs go through the shared `SyncRunner`, so at most one
//! run is active no matter whether the API or the scheduler started it.

#![allow(clippy::uninlined_format_args)]

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::json;
use tracing::{error, info, warn};

use crate::application::sync_service::{SyncRequest, SyncRunner};
use crate::domain::errors::{PortalError, SyncError};
use crate::infrastructure::portal::{ReportDocument, ReportSource};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<SyncRunner>,
    pub reports: Arc<dyn ReportSource>,
    auth_token: Arc<str>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    pub fn new(
        runner: Arc<SyncRunner>,
        reports: Arc<dyn ReportSource>,
        auth_token: impl Into<Arc<str>>,
        requests_per_minute: u32,
    ) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            runner,
            reports,
            auth_token: auth_token.into(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(json!({ "message": text.into() }))).into_response()
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.limiter.check().is_err() {
        warn!("🚦 Request rate limit exceeded");
        return message(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests, please try again later.",
        );
    }
    next.run(request).await
}

async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return message(StatusCode::UNAUTHORIZED, "Authorization header is missing");
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.split_whitespace().nth(1))
        .unwrap_or_default();
    if token != &*state.auth_token {
        return message(StatusCode::FORBIDDEN, "Invalid authorization token");
    }
    next.run(request).await
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sync_running": state.runner.is_running(),
    }))
}

async fn start_sync(State(state): State<AppState>, Query(request): Query<SyncRequest>) -> Response {
    match state.runner.spawn_exclusive(request) {
        Ok(_) => {
            info!("📨 Sync started in background ({:?})", request);
            (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))).into_response()
        }
        Err(e) => message(StatusCode::CONFLICT, e.to_string()),
    }
}

async fn run_sync(State(state): State<AppState>, Query(request): Query<SyncRequest>) -> Response {
    match state.runner.run_exclusive(request).await {
        Ok(report) => Json(report).into_response(),
        Err(e @ SyncError::AlreadyRunning) => message(StatusCode::CONFLICT, e.to_string()),
        Err(e) => {
            error!("❌ Sync failed: {}", e);
            message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn csv_report(State(state): State<AppState>, Path(document): Path<String>) -> Response {
    let document: ReportDocument = match document.parse() {
        Ok(doc) => doc,
        Err(_) => {
            warn!("Unknown report document requested: {}", document);
            return (StatusCode::BAD_REQUEST, "bad request").into_response();
        }
    };

    match state.reports.fetch_csv(document).await {
        Ok(csv) => {
            info!("📄 Sending {} report ({} bytes)", document, csv.len());
            let filename = format!("attachment; filename=\"{}\"", document.file_name());
            let disposition = HeaderValue::from_str(&filename)
                .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
            (
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response()
        }
        Err(PortalError::NotConfigured(doc)) => message(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("report {doc} is not configured"),
        ),
        Err(e) => {
            error!("❌ Report export for {} failed: {}", document, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error!").into_response()
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", post(start_sync))
        .route("/sync/wait", post(run_sync))
        .route("/csv/:document", get(csv_report))
        .layer(middleware::from_fn_with_state(state.clone(), authorize))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state)
}

/// Serves until ctrl-c
pub async fn serve(bind_address: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!("🌐 Listening on {}", bind_address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("🛑 Shutdown signal received");
        })
        .await
        .context("HTTP server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sync_service::{SyncService, SyncSettings};
    use crate::domain::credential::VendorCredential;
    use crate::domain::repositories::CatalogRepository;
    use crate::infrastructure::in_memory_repository::InMemoryCatalogRepository;
    use crate::test_utils::ScriptedTransport;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use tower::ServiceExt;

    struct FixedReports;

    #[async_trait]
    impl ReportSource for FixedReports {
        async fn fetch_csv(&self, document: ReportDocument) -> Result<Vec<u8>, PortalError> {
            match document {
                ReportDocument::Billing => Err(PortalError::SessionExpired),
                ReportDocument::Fees => Err(PortalError::NotConfigured("fees".into())),
                other => Ok(format!("report\n{other}\n").into_bytes()),
            }
        }
    }

    fn state(catalog: u64, per_minute: u32) -> (AppState, Arc<InMemoryCatalogRepository>) {
        state_with(ScriptedTransport::with_catalog(catalog), per_minute)
    }

    fn state_with(
        transport: ScriptedTransport,
        per_minute: u32,
    ) -> (AppState, Arc<InMemoryCatalogRepository>) {
        let transport = Arc::new(transport);
        let repo = Arc::new(InMemoryCatalogRepository::default());
        let settings = SyncSettings {
            credentials: vec![VendorCredential::new("a", "secret")],
            ..SyncSettings::default()
        };
        let service = SyncService::new(transport, repo.clone(), settings);
        let runner = Arc::new(SyncRunner::new(Arc::new(service)));
        (AppState::new(runner, Arc::new(FixedReports), "s3cret", per_minute), repo)
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_and_wrong_tokens_are_rejected() {
        let (state, _) = state(10, 100);
        let app = router(state);

        let missing = app.clone().oneshot(request("GET", "/health", None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app.clone().oneshot(request("GET", "/health", Some("nope"))).await.unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

        let ok = app.oneshot(request("GET", "/health", Some("s3cret"))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rate_limit_answers_429() {
        let (state, _) = state(10, 2);
        let app = router(state);
        for _ in 0..2 {
            let res = app.clone().oneshot(request("GET", "/health", Some("s3cret"))).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        let limited = app.oneshot(request("GET", "/health", Some("s3cret"))).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn csv_route_validates_document() {
        let (state, _) = state(10, 100);
        let app = router(state);

        let bad = app.clone().oneshot(request("GET", "/csv/orders", Some("s3cret"))).await.unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let ok = app.clone().oneshot(request("GET", "/csv/sales", Some("s3cret"))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            ok.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"sales_report.csv\""
        );
        let body = to_bytes(ok.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"report\nsales\n");

        let failed = app
            .clone()
            .oneshot(request("GET", "/csv/billing", Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let unconfigured = app.oneshot(request("GET", "/csv/fees", Some("s3cret"))).await.unwrap();
        assert_eq!(unconfigured.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_wait_returns_report() {
        let (state, repo) = state(120, 100);
        let app = router(state);

        let res = app
            .oneshot(request("POST", "/sync/wait?total=100", Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["inserted"], 100);
        assert_eq!(repo.count().await.unwrap(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sync_conflicts_while_running() {
        let slow =
            ScriptedTransport::with_catalog(50).with_latency(std::time::Duration::from_secs(60));
        let (state, _) = state_with(slow, 100);
        let runner = state.runner.clone();
        let app = router(state);

        let started = app.clone().oneshot(request("POST", "/sync", Some("s3cret"))).await.unwrap();
        assert_eq!(started.status(), StatusCode::ACCEPTED);
        assert!(runner.is_running());

        let conflict = app.oneshot(request("POST", "/sync", Some("s3cret"))).await.unwrap();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }
}
