//! API Handlers
//!
//! HTTP request handlers for each blob server endpoint.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::blob::{BlobName, BlobStore, ChunkSettings};
use crate::cache::{CacheBackend, KvCache};
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    ErrorResponse, HealthResponse, InfoResponse, StatsResponse, StoreParams, StoreResponse,
};

/// Response header carrying the hex SHA-256 of a returned blob.
pub const CONTENT_SHA256_HEADER: &str = "x-content-sha256";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub blobs: Arc<BlobStore<CacheBackend>>,
}

impl AppState {
    pub fn new(cache: CacheBackend, settings: ChunkSettings) -> Self {
        Self {
            blobs: Arc::new(BlobStore::new(cache, settings)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            CacheBackend::from_config(config),
            ChunkSettings::from_config(config),
        )
    }

    pub fn cache(&self) -> &CacheBackend {
        self.blobs.cache()
    }
}

/// Handler for GET /info
///
/// Echoes the request back along with the configured cache server.
pub async fn info_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Json<InfoResponse> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.host().map(str::to_string));

    let headers = headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<binary>").to_string();
            (name.to_string(), value)
        })
        .collect();

    Json(InfoResponse {
        method: method.to_string(),
        uri: uri.to_string(),
        version: format!("{:?}", version),
        host,
        remote_addr: connect_info.map(|ConnectInfo(addr)| addr.to_string()),
        headers,
        query,
        cache_server: state.cache().describe(),
    })
}

/// Handler for GET /health
///
/// Pings the cache; 503 when it cannot be reached.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let cache = state.cache().describe();
    match state.cache().ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy(cache))),
        Err(e) => {
            warn!("Health check against {} failed: {}", cache, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::unavailable(cache, e.to_string())),
            )
        }
    }
}

/// Handler for GET /stats
///
/// Only the in-memory backend keeps statistics.
pub async fn stats_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<StatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.cache().as_memory() {
        Some(cache) => Ok(Json(StatsResponse::from(cache.stats().await))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "no statistics for memcached backend at {}",
                state.cache().describe()
            ))),
        )),
    }
}

/// Handler for PUT /blobs/:name
///
/// Stores the request body as a chunked blob.
pub async fn store_blob_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<StoreParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<StoreResponse>)> {
    let name = BlobName::new(name)?;
    let receipt = state.blobs.store_bytes(&name, &body, params.force).await?;

    Ok((StatusCode::CREATED, Json(StoreResponse::from(receipt))))
}

/// Handler for GET /blobs/:name
///
/// Returns the blob only once its digest matches the manifest.
pub async fn retrieve_blob_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response> {
    let name = BlobName::new(name)?;
    let retrieved = state.blobs.retrieve(&name).await?;
    let sha256 = retrieved.assembly.actual.to_hex();
    let data = retrieved.into_verified()?;

    Ok((
        [
            ("content-type", "application/octet-stream".to_string()),
            (CONTENT_SHA256_HEADER, sha256),
        ],
        data,
    )
        .into_response())
}
