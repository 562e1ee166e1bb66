//! Concrete collaborators for the engine.

pub mod heuristic;
pub mod template;

pub use heuristic::HeuristicCapabilityOrchestrator;
pub use template::TemplateLegacyPath;
