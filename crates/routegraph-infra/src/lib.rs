//! Infrastructure layer for routegraph.
//!
//! Loads configuration and graph definitions from the data directory and
//! provides the concrete collaborators the engine calls outward.

pub mod collab;
pub mod config;
pub mod filesystem;
