//! Resolution records as persisted in the cache directory

use crate::cache::fingerprint::Fingerprint;
use crate::resolver::{Pin, SolverMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Outcome of one successful resolution
///
/// Pins never change after creation; a changed requirement set has a
/// different fingerprint and gets its own record. Only `modules` grows, as
/// more modules with identical requirements are served from the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// Content identity of the requirement set
    pub fingerprint: Fingerprint,

    /// Module whose resolution produced this record
    pub module: String,

    /// Every module served from this record
    #[serde(default)]
    pub modules: BTreeSet<String>,

    /// Normalized requirements that were resolved
    pub requirements: Vec<String>,

    /// Pinned packages in solver order
    pub packages: Vec<Pin>,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// Solver that produced the pins
    pub solver: SolverMetadata,
}

impl ResolutionRecord {
    /// Create a new record stamped with the current time
    pub fn new(
        fingerprint: Fingerprint,
        module: impl Into<String>,
        requirements: Vec<String>,
        packages: Vec<Pin>,
        solver: SolverMetadata,
    ) -> Self {
        let module = module.into();
        Self {
            fingerprint,
            modules: BTreeSet::from([module.clone()]),
            module,
            requirements,
            packages,
            created_at: Utc::now(),
            solver,
        }
    }

    /// Same pins from the same solver, ignoring timestamp and module
    pub fn same_resolution(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.packages == other.packages
            && self.solver == other.solver
    }

    /// Whether `module` has been served from this record
    pub fn serves(&self, module: &str) -> bool {
        self.module == module || self.modules.contains(module)
    }

    /// Record another module; false if it was already known
    pub fn add_module(&mut self, module: &str) -> bool {
        self.modules.insert(module.to_string())
    }

    /// Check if this record is older than the given number of days
    pub fn is_older_than_days(&self, days: u32) -> bool {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.created_at < cutoff
    }
}
