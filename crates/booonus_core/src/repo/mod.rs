//! Repository layer for locally persisted client state.
//!
//! # Responsibility
//! - Define the key-value persistence contract used by config and sync.
//! - Isolate SQLite query details from orchestration code.

pub mod kv_repo;
