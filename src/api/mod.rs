//! API Module
//!
//! HTTP handlers and routing for the blob server REST API.
//!
//! # Endpoints
//! - `GET /info` - Echo of the request
//! - `GET /health` - Cache reachability
//! - `GET /stats` - In-memory cache statistics
//! - `PUT /blobs/:name` - Store a blob
//! - `GET /blobs/:name` - Retrieve a blob

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
