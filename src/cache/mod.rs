//! Persistent resolution cache
//!
//! Provides content-addressed caching keyed by requirement fingerprints.
//! Records are immutable once written; a changed requirement set hashes to a
//! new fingerprint and gets a new entry.
//!
//! # Layout
//!
//! ```text
//! <cache_dir>/
//!   <fingerprint>.json      one ResolutionRecord per entry
//!   .<fingerprint>.<id>.tmp in-progress write, renamed into place
//! ```
//!
//! # Entry lifecycle
//!
//! | Event | Effect |
//! |-------|--------|
//! | First successful resolution | entry created |
//! | Lookup | entry read, never modified |
//! | Forced re-resolution | entry replaced if the pins changed |
//! | Invalidation | entry deleted |

pub mod fingerprint;
pub mod record;
pub mod store;

pub use fingerprint::{
    canonicalize_name, fingerprint, fingerprint_with_environment, Fingerprint, RequirementSet,
};
pub use record::{format_bytes, ResolutionRecord};
pub use store::{CacheStats, ResolutionStore};
