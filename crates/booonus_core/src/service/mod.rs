//! Use-case services for the UI layer.
//!
//! # Responsibility
//! - Orchestrate API calls, local state and notifications into the
//!   operations screens invoke.
//! - Keep screens decoupled from storage and HTTP details.

pub mod session_service;
