//! depcache - Dependency resolution cache
//!
//! Memoizes solver output keyed by a fingerprint of each module's
//! requirements, and makes sure identical requests in flight share one
//! solver invocation.

pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod resolver;

pub use error::{DepcacheError, DepcacheResult};
pub use manager::{BulkHandle, CallOptions, DependencyManager, ManagerConfig};
