//! Shared domain types for routegraph.
//!
//! Graph nodes, trace records, configuration, collaborator payloads and their
//! error types. Zero infrastructure dependencies -- only serde, chrono and
//! thiserror.

pub mod capability;
pub mod config;
pub mod error;
pub mod node;
pub mod result;
pub mod trace;
