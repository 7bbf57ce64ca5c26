/**
 * API REST AGGREGATOR - Couche de présentation HTTP du kernel
 *
 * RÔLE :
 * Expose la vue unifiée (hosts + alertes) et la route proxy. Couche mince :
 * tout passe par `AggregationEngine` (lecture) et `ProxyGateway` (relais).
 *
 * ROUTES :
 * - GET  /health                          → santé du kernel
 * - GET  /api/hosts                       → joignabilité par host configuré
 * - GET  /api/alerts                      → snapshot + histogramme + hosts injoignables
 * - GET|HEAD|POST|PUT|PATCH /api/proxy/{hostname}/{*path} → relais vers un host
 * - GET|HEAD|POST|PUT|PATCH /api/proxy/{hostname}/         → racine du host
 *
 * Pas de limite de taille sur les corps relayés (limite axum désactivée).
 *
 * ERREURS PROXY : JSON `{error, detail, host}` avec 403 / 504 / 502.
 * CORS : front local (http://localhost:3000) en développement, GET uniquement.
 */

use crate::config::KernelConfig;
use crate::engine::AggregationEngine;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{Alert, HostStatus, Severity};
use crate::proxy::{ProxyError, ProxyGateway, ProxyRequest};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, RawQuery, State};
use axum::http::{header, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, on, MethodFilter};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AggregationEngine>,
    pub gateway: ProxyGateway,
    pub health_tracker: HealthTracker,
}

pub fn build_router(app_state: AppState, cfg: &KernelConfig) -> Router {
    let proxy_methods = MethodFilter::GET
        .or(MethodFilter::HEAD)
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::PATCH);

    Router::new()
        .route("/health", get(get_health))
        .route("/api/hosts", get(get_hosts))
        .route("/api/alerts", get(get_alerts))
        .route(
            "/api/proxy/{hostname}/{*path}",
            on(proxy_methods, proxy).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/api/proxy/{hostname}/",
            on(proxy_methods, proxy_root).layer(DefaultBodyLimit::disable()),
        )
        .with_state(app_state)
        .layer(cors_layer(cfg))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(cfg: &KernelConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .allowed_origins()
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

// ============ VUES JSON ============

#[derive(Serialize)]
struct HostStatusView {
    reachable: bool,
    last_check: Option<String>,   // RFC3339, null si jamais pollé
    alert_count: usize,
    error_message: Option<String>,
}

#[derive(Serialize)]
struct HostView {
    name: String,
    url: String,
    status: HostStatusView,
}

#[derive(Serialize)]
struct HostsResponse {
    hosts: Vec<HostView>,
    total: usize,
    healthy: usize,
}

#[derive(Serialize, Default)]
struct SeverityCounts {
    critical: usize,
    warning: usize,
    info: usize,
}

#[derive(Serialize)]
struct AlertsResponse<'a> {
    alerts: &'a [Alert],
    total: usize,
    by_severity: SeverityCounts,
    unreachable_hosts: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    detail: String,
    host: &'a str,
}

fn to_status_view(status: Option<&HostStatus>) -> HostStatusView {
    match status {
        Some(s) => HostStatusView {
            reachable: s.reachable,
            last_check: s.last_check.format(&Rfc3339).ok(),
            alert_count: s.alert_count,
            error_message: s.error_message.clone(),
        },
        None => HostStatusView {
            reachable: false,
            last_check: None,
            alert_count: 0,
            error_message: None,
        },
    }
}

fn count_by_severity(alerts: &[Alert]) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for alert in alerts {
        match alert.severity {
            Severity::Critical => counts.critical += 1,
            Severity::Warning => counts.warning += 1,
            Severity::Info => counts.info += 1,
        }
    }
    counts
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind(),
            detail: self.to_string(),
            host: self.host(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

// ============ HANDLERS ============

// GET /health
async fn get_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.engine))
}

// GET /api/hosts (ordre du fichier de config)
async fn get_hosts(State(app): State<AppState>) -> Json<HostsResponse> {
    let hosts = app.engine.registry().snapshot();

    let views: Vec<HostView> = hosts
        .iter()
        .map(|h| HostView {
            name: h.display_name.clone(),
            url: h.url.to_string(),
            status: to_status_view(app.engine.host_status(&h.display_name).as_ref()),
        })
        .collect();
    let healthy = views.iter().filter(|v| v.status.reachable).count();

    Json(HostsResponse { total: views.len(), healthy, hosts: views })
}

// GET /api/alerts
async fn get_alerts(State(app): State<AppState>) -> Response {
    let alerts = app.engine.alerts();
    let statuses = app.engine.host_statuses();

    let mut unreachable_hosts: Vec<String> = statuses
        .values()
        .filter(|s| !s.reachable)
        .map(|s| s.hostname.clone())
        .collect();
    unreachable_hosts.sort();

    let body = AlertsResponse {
        alerts: &alerts,
        total: alerts.len(),
        by_severity: count_by_severity(&alerts),
        unreachable_hosts,
    };
    Json(body).into_response()
}

// GET|HEAD|POST|PUT|PATCH /api/proxy/{hostname}/{*path}
async fn proxy(
    State(app): State<AppState>,
    Path((hostname, path)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, ProxyError> {
    relay(&app, &hostname, &path, method, query, body).await
}

// GET|HEAD|POST|PUT|PATCH /api/proxy/{hostname}/ (wildcard vide → racine amont)
async fn proxy_root(
    State(app): State<AppState>,
    Path(hostname): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, ProxyError> {
    relay(&app, &hostname, "", method, query, body).await
}

async fn relay(
    app: &AppState,
    hostname: &str,
    path: &str,
    method: Method,
    query: Option<String>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let mut request = ProxyRequest::new(method).with_body(body);
    if let Some(q) = query {
        request = request.with_query(q);
    }
    let started = Instant::now();

    let upstream = app.gateway.forward(hostname, path, request).await?;
    debug!(host = %hostname, path = %path, status = %upstream.status,
           elapsed_ms = started.elapsed().as_millis() as u64, "proxied");

    let mut response = Response::new(Body::from_stream(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    Ok(response)
}
