//! Request and Response models for the blob server API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request parameters and response bodies.

pub mod requests;
pub mod responses;

pub use requests::StoreParams;
pub use responses::{ErrorResponse, HealthResponse, InfoResponse, StatsResponse, StoreResponse};
