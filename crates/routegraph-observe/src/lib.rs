//! Observability setup for routegraph.

pub mod tracing_setup;
