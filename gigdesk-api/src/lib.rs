//! REST API server for the Gigdesk marketplace
//!
//! Thin axum adapter over `gigdesk-core`: every handler resolves the
//! bearer credential through the authorization guard, calls one core
//! operation, and serializes the result. No business rules live here.

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{router, ApiState};
pub use server::{serve, ServerConfig};
