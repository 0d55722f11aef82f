//! Explicit record types for everything crossing the network boundary.
//!
//! # Invariants
//! - Payloads are validated on parse instead of trusted by shape.

pub mod profile;
pub mod records;
