//! External collaborators the engine calls outward.
//!
//! - `capability` -- capability orchestration, invoked by capability nodes
//! - `legacy` -- the legacy processing path used by the fallback controller
//! - `boxed` -- object-safe wrappers for runtime selection of implementations
//!
//! Implementations live in routegraph-infra (and in test modules).

pub mod boxed;
pub mod capability;
pub mod legacy;
