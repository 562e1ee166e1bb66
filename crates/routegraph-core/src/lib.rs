//! Decision-graph orchestration engine.
//!
//! A request enters through [`engine::Orchestrator::wire_orchestration`], is
//! routed by the [`fallback::FallbackController`] either to the legacy path or
//! to the [`walker::GraphWalker`], which visits decision nodes through the
//! [`executor::NodeExecutor`]. Every visited node leaves one record in the
//! [`trace::TraceRecorder`].

pub mod builtin;
pub mod collab;
pub mod condition;
pub mod context;
pub mod dataflow;
pub mod engine;
pub mod executor;
pub mod fallback;
pub mod registry;
pub mod trace;
pub mod walker;
