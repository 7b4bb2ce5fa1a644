//! Core library modules for butterfly-probe
//!
//! This module contains the internal implementation details of the butterfly-probe library.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod locations;
pub mod native;
pub mod pool;
pub mod runner;
pub mod sampler;
pub mod stats;

// Re-export main types for internal use
pub use config::{Action, Defaults, RunConfig, TransportTarget};
pub use pool::WorkerPool;
