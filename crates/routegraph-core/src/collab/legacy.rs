//! LegacyPath trait definition.

use routegraph_types::result::{LegacyError, LegacyResult};
use serde_json::{Map, Value};

/// The pre-graph processing path.
///
/// Always available to the fallback controller. Implementations must not call
/// back into the graph walker, or a failing graph would fall back into itself.
pub trait LegacyPath: Send + Sync {
    fn process(
        &self,
        correlation_id: &str,
        input: &Value,
        context: &Map<String, Value>,
    ) -> impl std::future::Future<Output = Result<LegacyResult, LegacyError>> + Send;
}
