//! repair-relay library crate
//!
//! Exposes the core modules so the CLI, benchmarks and tests share one
//! implementation of the corpus, graph, completion client and repair loop.

pub mod config;
pub mod corpus;
pub mod github;
pub mod graph;
pub mod keyring;
pub mod llm;
pub mod session;
pub mod store;
pub mod util;
