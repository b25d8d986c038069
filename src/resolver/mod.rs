//! Resolver adapter boundary
//!
//! The external constraint solver sits behind the [`Resolver`] trait so the
//! cache and coordination layers never depend on a concrete backend:
//! - `pip-compile` (pip-tools), spawned as a subprocess
//! - test doubles that count invocations

mod pip_compile;
mod specifier;

pub use pip_compile::{parse_lock_output, PipCompileResolver};
pub use specifier::{validate_requirements, validate_specifier};

use crate::cache::RequirementSet;
use crate::config::schema::ResolverConfig;
use crate::error::DepcacheResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A resolved exact package version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pin {
    pub name: String,
    pub version: String,
}

impl Pin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Identity of the solver that produced a resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverMetadata {
    pub name: String,
    pub version: String,
}

/// Abstract constraint solver
///
/// Implementations perform no caching. Failures are reported as
/// `Unsatisfiable`, `SolverUnavailable` or `InvalidSpecifier`.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a requirement set into an ordered list of pins
    async fn resolve(&self, requirements: &RequirementSet) -> DepcacheResult<Vec<Pin>>;

    /// Solver name and version, recorded alongside each resolution
    async fn metadata(&self) -> SolverMetadata;

    /// Tag mixed into fingerprints so results never cross solvers or platforms
    ///
    /// Built from local, stable inputs only. It is computed on every lookup,
    /// cache hits included, so it must not run the solver.
    fn environment(&self) -> String {
        format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH)
    }
}

/// Create the configured solver backend
pub fn create_resolver(config: &ResolverConfig) -> Arc<dyn Resolver> {
    Arc::new(PipCompileResolver::new(config))
}
