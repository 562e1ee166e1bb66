//! Object-safe wrappers for the collaborator traits.
//!
//! Same blanket-impl pattern for both collaborators:
//! 1. An object-safe `*Dyn` trait with boxed futures
//! 2. A blanket impl of it for every implementor of the RPITIT trait
//! 3. A cloneable `Box*` handle wrapping `Arc<dyn *Dyn>` and delegating

use std::sync::Arc;

use futures_util::future::BoxFuture;
use routegraph_types::capability::{CapabilityDecision, CapabilityError, CapabilityRequest};
use routegraph_types::result::{LegacyError, LegacyResult};
use serde_json::{Map, Value};

use super::capability::CapabilityOrchestrator;
use super::legacy::LegacyPath;

// ---------------------------------------------------------------------------
// Capability orchestrator
// ---------------------------------------------------------------------------

/// Object-safe version of [`CapabilityOrchestrator`].
pub trait CapabilityOrchestratorDyn: Send + Sync {
    fn name(&self) -> &str;

    fn activate_boxed<'a>(
        &'a self,
        request: &'a CapabilityRequest,
    ) -> BoxFuture<'a, Result<CapabilityDecision, CapabilityError>>;
}

impl<T: CapabilityOrchestrator> CapabilityOrchestratorDyn for T {
    fn name(&self) -> &str {
        CapabilityOrchestrator::name(self)
    }

    fn activate_boxed<'a>(
        &'a self,
        request: &'a CapabilityRequest,
    ) -> BoxFuture<'a, Result<CapabilityDecision, CapabilityError>> {
        Box::pin(self.activate(request))
    }
}

/// Type-erased, cheaply cloneable capability orchestrator.
#[derive(Clone)]
pub struct BoxCapabilityOrchestrator {
    inner: Arc<dyn CapabilityOrchestratorDyn>,
}

impl BoxCapabilityOrchestrator {
    pub fn new<T: CapabilityOrchestrator + 'static>(orchestrator: T) -> Self {
        Self {
            inner: Arc::new(orchestrator),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn activate(
        &self,
        request: &CapabilityRequest,
    ) -> Result<CapabilityDecision, CapabilityError> {
        self.inner.activate_boxed(request).await
    }
}

impl std::fmt::Debug for BoxCapabilityOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxCapabilityOrchestrator")
            .field("name", &self.name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Legacy path
// ---------------------------------------------------------------------------

/// Object-safe version of [`LegacyPath`].
pub trait LegacyPathDyn: Send + Sync {
    fn process_boxed<'a>(
        &'a self,
        correlation_id: &'a str,
        input: &'a Value,
        context: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<LegacyResult, LegacyError>>;
}

impl<T: LegacyPath> LegacyPathDyn for T {
    fn process_boxed<'a>(
        &'a self,
        correlation_id: &'a str,
        input: &'a Value,
        context: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<LegacyResult, LegacyError>> {
        Box::pin(self.process(correlation_id, input, context))
    }
}

/// Type-erased, cheaply cloneable legacy path.
#[derive(Clone)]
pub struct BoxLegacyPath {
    inner: Arc<dyn LegacyPathDyn>,
}

impl BoxLegacyPath {
    pub fn new<T: LegacyPath + 'static>(legacy: T) -> Self {
        Self {
            inner: Arc::new(legacy),
        }
    }

    pub async fn process(
        &self,
        correlation_id: &str,
        input: &Value,
        context: &Map<String, Value>,
    ) -> Result<LegacyResult, LegacyError> {
        self.inner.process_boxed(correlation_id, input, context).await
    }
}

impl std::fmt::Debug for BoxLegacyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLegacyPath").finish_non_exhaustive()
    }
}
