//! Backend HTTP access.
//!
//! # Responsibility
//! - Wrap every `/api/v1` route the client uses in a typed async call.
//! - Map transport, status and body failures into `ApiError`.

pub mod client;
pub mod error;
pub mod types;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
