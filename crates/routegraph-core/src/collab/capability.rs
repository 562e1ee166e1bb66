//! CapabilityOrchestrator trait definition.

use routegraph_types::capability::{CapabilityDecision, CapabilityError, CapabilityRequest};

/// Decides which capabilities should serve a request.
///
/// Calls may be slow; the executor bounds every call with a deadline and
/// treats a timeout as a node failure.
pub trait CapabilityOrchestrator: Send + Sync {
    /// Human-readable orchestrator name, used in logs.
    fn name(&self) -> &str;

    /// Select capabilities for a request.
    fn activate(
        &self,
        request: &CapabilityRequest,
    ) -> impl std::future::Future<Output = Result<CapabilityDecision, CapabilityError>> + Send;
}
