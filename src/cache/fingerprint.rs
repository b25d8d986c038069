//! Requirement normalization and fingerprinting
//!
//! A fingerprint identifies a requirement set by content, not by the module
//! that declared it. Ordering, whitespace, comments, duplicate lines and
//! package-name spelling (`Foo_Bar` vs `foo-bar`) never change it; any other
//! difference does.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a fingerprint in hex characters (SHA-256)
pub const FINGERPRINT_LEN: usize = 64;

/// Requirement specifiers declared by one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementSet {
    module: String,
    specifiers: Vec<String>,
}

impl RequirementSet {
    /// Parse requirements-file text, dropping blank lines and comments
    pub fn parse(module: impl Into<String>, text: &str) -> Self {
        let specifiers = text
            .lines()
            .map(|line| strip_comment(line).trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            module: module.into(),
            specifiers,
        }
    }

    /// Name of the module that declared these requirements
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Specifiers in declaration order, trimmed
    pub fn specifiers(&self) -> &[String] {
        &self.specifiers
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    /// Canonical, sorted and deduplicated form used for hashing
    pub fn normalized(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .specifiers
            .iter()
            .map(|s| normalize_specifier(s))
            .collect();
        lines.sort_unstable();
        lines.dedup();
        lines
    }

    /// Render back to requirements-file text
    pub fn to_text(&self) -> String {
        let mut text = self.specifiers.join("\n");
        text.push('\n');
        text
    }
}

/// Content identity of a normalized requirement set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Accept a full-length lowercase hex fingerprint
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let valid = value.len() == FINGERPRINT_LEN && value.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then_some(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for display
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint a requirement set with no environment tag
pub fn fingerprint(requirements: &RequirementSet) -> Fingerprint {
    fingerprint_with_environment(requirements, "")
}

/// Fingerprint a requirement set under a solver/platform environment tag
///
/// Entries produced by a different solver or on a different platform hash to
/// different keys and are never served across environments.
pub fn fingerprint_with_environment(requirements: &RequirementSet, environment: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(environment.as_bytes());
    hasher.update([0u8]);
    for line in requirements.normalized() {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    Fingerprint(hex::encode(hasher.finalize()))
}

/// Canonical package name: lowercase, separator runs collapsed to `-`
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// A `#` starts a comment at line start or after whitespace
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return &line[..i];
        }
    }
    line
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_specifier(line: &str) -> String {
    // Option lines (-r, --index-url, ...)
    if line.starts_with('-') {
        return collapse_whitespace(line);
    }

    let (requirement, marker) = match line.split_once(';') {
        Some((r, m)) => (r, Some(m)),
        None => (line, None),
    };

    let requirement = requirement.trim();
    let name_end = requirement
        .find(|c: char| !is_name_char(c))
        .unwrap_or(requirement.len());
    let mut out = canonicalize_name(&requirement[..name_end]);
    let mut rest = requirement[name_end..].trim();

    if let Some(after_bracket) = rest.strip_prefix('[') {
        if let Some((extras, after)) = after_bracket.split_once(']') {
            let mut extras: Vec<String> = extras
                .split(',')
                .map(|e| canonicalize_name(e.trim()))
                .filter(|e| !e.is_empty())
                .collect();
            extras.sort_unstable();
            extras.dedup();
            out.push('[');
            out.push_str(&extras.join(","));
            out.push(']');
            rest = after.trim();
        }
    }

    if let Some(url) = rest.strip_prefix('@') {
        out.push_str(" @ ");
        out.push_str(url.trim());
    } else {
        let compact: String = rest
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let mut clauses: Vec<&str> = compact.split(',').filter(|c| !c.is_empty()).collect();
        clauses.sort_unstable();
        clauses.dedup();
        out.push_str(&clauses.join(","));
    }

    if let Some(marker) = marker.map(collapse_whitespace).filter(|m| !m.is_empty()) {
        out.push_str("; ");
        out.push_str(&marker);
    }

    out
}
