//! # UNISTITCH
//!
//! Cross-language call-graph unification for applications that mix an
//! interpreted language with compiled extension libraries.
//!
//! The engine takes per-package partial call graphs, bridge records tying
//! interpreted call sites to native symbols, and per-library native call
//! graphs, and turns them into one global graph:
//!
//! - **augment**: attach bridge records to the partial call graphs
//! - **stitch**: merge an application and its dependencies into one id space
//! - **unify**: merge native library graphs and settle symbol ownership
//! - **reach**: keep what the application's own code can reach
//! - **chains**: call chains and centrality for a target symbol
//!
//! Every stage is a library call and a `unistitch` subcommand.

pub mod config;
pub mod core;
pub mod documents;
pub mod error;
pub mod formatters;

pub use crate::config::EngineConfig;
pub use crate::error::{EngineError, EngineResult};
