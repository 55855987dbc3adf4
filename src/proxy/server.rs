use anyhow::{Context, Result};
use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::config::ProxyConfig;
use super::error::LookupError;
use super::models::LookupResponse;
use super::service::LookupService;

#[derive(Clone)]
struct AppState {
    service: Arc<LookupService>,
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    cnpj: Option<String>,
}

pub async fn start_server(config: ProxyConfig) -> Result<()> {
    let service = Arc::new(LookupService::from_config(&config)?);
    let sweeper = super::sweeper::spawn_sweeper(service.clone(), config.sweep_interval);

    let app = build_router(service);

    let addr = format!("{}:{}", config.get_bind_address(), config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("CNPJ proxy listening on http://{}", addr);
    tracing::info!(
        "Upstream {} (timeout {:?}), cache {} entries / {:?} TTL, limits {}/min per IP and {}/min per CNPJ",
        config.upstream.base_url,
        config.upstream.timeout,
        config.cache.max_entries,
        config.cache.ttl,
        config.rate_limit.per_client,
        config.rate_limit.per_identifier
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("Proxy server stopped");

    Ok(())
}

pub fn build_router(service: Arc<LookupService>) -> Router {
    Router::new()
        .route("/", lookup_route(get(handle_lookup)))
        .route("/api/cnpj", lookup_route(get(handle_lookup)))
        .route("/api/cnpj/:cnpj", lookup_route(get(handle_lookup_path)))
        .route("/healthz", get(health_check))
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(Any),
        )
        .with_state(AppState { service })
}

/// OPTIONS is an empty 200 (preflights are answered by the CORS layer before
/// reaching it). Anything else other than GET gets a JSON 405 before rate
/// limiting or validation.
fn lookup_route(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    // `get` also serves HEAD unless HEAD has its own endpoint
    route
        .head(method_not_allowed)
        .options(|| async { StatusCode::OK })
        .fallback(method_not_allowed)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn health_check(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "service": crate::constants::SERVICE_NAME,
        "cacheEntries": state.service.cache_len(),
    }))
    .into_response()
}

async fn route_not_found(uri: Uri) -> Response {
    tracing::info!("No route for {}", uri.path());
    LookupError::RouteNotFound.into_response()
}

async fn method_not_allowed(method: Method) -> Response {
    tracing::info!("Rejected {} request", method);
    LookupError::MethodNotAllowed.into_response()
}

async fn handle_lookup(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    params: Result<Query<LookupParams>, QueryRejection>,
) -> Response {
    let cnpj = params.ok().and_then(|Query(p)| p.cnpj);
    respond(&state, client_address(&headers, peer), cnpj.as_deref()).await
}

async fn handle_lookup_path(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(cnpj): Path<String>,
) -> Response {
    respond(&state, client_address(&headers, peer), Some(&cnpj)).await
}

async fn respond(state: &AppState, client: String, cnpj: Option<&str>) -> Response {
    tracing::info!("📥 Lookup from {} for {:?}", client, cnpj);

    match state.service.lookup(&client, cnpj).await {
        Ok(outcome) => {
            tracing::info!(
                "✅ {} resolved ({})",
                outcome.record.tax_id,
                if outcome.cached { "cache" } else { "registry" }
            );
            (
                StatusCode::OK,
                Json(LookupResponse::new(outcome.record, outcome.cached)),
            )
                .into_response()
        }
        Err(err) => {
            tracing::info!("❌ Lookup failed with {}: {}", err.status_code(), err);
            err.into_response_with(state.service.detailed_errors())
        }
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
fn client_address(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
