//! HTTP surface: the intercepting proxy and the engine's control endpoints.
//!
//! - `POST /__lampstand/message`: control message, answers with the status
//! - `GET /__lampstand/status`: engine status
//! - `GET /__lampstand/events`: server-sent `navigate` events
//! - anything else: handed to the engine, or passed through to the origin

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lampstand_client::fetch::RequestMode;
use lampstand_client::{
    CacheMode, ControlMessage, FetchEvent, FetchRequest, FetchResponse, Network, OfflineWorker, WorkerStatus,
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::ServerError;
use crate::host::{ANONYMOUS_CLIENT, CLIENT_HEADER, HostEvent, ProxyHost};

pub const PRELOAD_HEADER: &str = "service-worker-navigation-preload";

/// Largest request body the proxy will buffer.
const MAX_REQUEST_BODY: usize = 2 * 1024 * 1024;

/// Response headers describing the upstream connection, not the resource.
const HOP_BY_HOP: &[&str] = &["connection", "content-length", "keep-alive", "transfer-encoding", "upgrade"];

#[derive(Clone)]
pub struct AppState {
    pub worker: OfflineWorker,
    pub network: Arc<dyn Network>,
    pub host: Arc<ProxyHost>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/__lampstand/message", post(message))
        .route("/__lampstand/status", get(status))
        .route("/__lampstand/events", get(events))
        .fallback(intercept)
        .with_state(state)
}

async fn message(
    State(state): State<AppState>, Json(message): Json<ControlMessage>,
) -> Result<Json<WorkerStatus>, ServerError> {
    state.worker.handle_message(message).await?;
    Ok(Json(state.worker.status().await?))
}

async fn status(State(state): State<AppState>) -> Result<Json<WorkerStatus>, ServerError> {
    Ok(Json(state.worker.status().await?))
}

async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.host.subscribe()).filter_map(|event| match event {
        Ok(HostEvent::Navigate(path)) => Some(Ok(Event::default().event("navigate").data(path))),
        Err(lagged) => {
            tracing::debug!("event subscriber fell behind: {lagged}");
            None
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn intercept(State(state): State<AppState>, request: Request) -> Result<Response, ServerError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| lampstand_core::Error::InvalidInput(format!("request body: {e}")))?;

    let client = parts
        .headers
        .get(CLIENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_CLIENT);
    state.host.touch(client);

    let fetch_request = fetch_request_from_parts(&parts, body);
    let preload = navigation_preload(&state, &fetch_request).await;
    let event = FetchEvent::new(fetch_request.clone()).with_preload(preload);

    if let Some(response) = state.worker.handle_fetch(event).await {
        return Ok(into_response(response));
    }

    let response = state
        .network
        .fetch(&fetch_request, CacheMode::Default)
        .await
        .map_err(ServerError::Upstream)?;
    Ok(into_response(response))
}

/// Describe an incoming request the way a page would have issued it.
///
/// The mode comes from `Sec-Fetch-Mode`; without it, a GET accepting HTML
/// counts as a navigation. Leading slashes collapse to one so the target
/// stays a path on the origin.
pub fn fetch_request_from_parts(parts: &Parts, body: Bytes) -> FetchRequest {
    let url = match parts.uri.path_and_query() {
        Some(pq) => format!("/{}", pq.as_str().trim_start_matches('/')),
        None => "/".to_string(),
    };

    let sec_fetch_mode = parts
        .headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_sec_fetch_mode);
    let accepts_html = parts
        .headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));

    let mode = match sec_fetch_mode {
        Some(mode) => mode,
        None if parts.method == axum::http::Method::GET && accepts_html => RequestMode::Navigate,
        None => RequestMode::SameOrigin,
    };

    FetchRequest {
        method: parts.method.clone(),
        url,
        mode,
        headers: parts.headers.clone(),
        body: (!body.is_empty()).then_some(body),
    }
}

/// Issue the navigation fetch ahead of the engine when preload is on.
async fn navigation_preload(state: &AppState, request: &FetchRequest) -> Option<FetchResponse> {
    if !request.is_navigation()
        || !request.is_get()
        || !state.worker.state().can_intercept_fetch()
        || !state.worker.context().navigation_preload_enabled()
    {
        return None;
    }

    let preload = request
        .clone()
        .with_header(HeaderName::from_static(PRELOAD_HEADER), HeaderValue::from_static("true"));
    match state.network.fetch(&preload, CacheMode::Default).await {
        Ok(response) => Some(response),
        Err(e) => {
            tracing::debug!("navigation preload of {} failed: {e}", request.url);
            None
        }
    }
}

fn into_response(response: FetchResponse) -> Response {
    let mut out = Body::from(response.bytes).into_response();
    *out.status_mut() = response.status;
    let headers = out.headers_mut();
    for (name, value) in &response.headers {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    out
}
