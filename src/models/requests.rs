//! Request DTOs for the blob server API
//!
//! Defines the query parameters accepted by the blob endpoints.

use serde::Deserialize;

/// Query parameters for `PUT /blobs/:name`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreParams {
    /// Replace an existing blob of the same name
    #[serde(default)]
    pub force: bool,
}
