//! Marketplace core for the Gigdesk backend
//!
//! This crate implements the parts of the marketplace with real invariants:
//! - Order lifecycle and escrow settlement state machine
//! - Dispute filing and admin resolution
//! - Role- and ownership-gated authorization
//! - Durable flat-file record storage with single-writer discipline
//!
//! The HTTP surface lives in `gigdesk-api`; this crate knows nothing about
//! transport.

pub mod auth;
pub mod error;
pub mod marketplace;
pub mod models;
pub mod session;
pub mod store;

use error::MarketError;

/// Result type alias for marketplace operations
pub type MarketResult<T> = Result<T, MarketError>;
