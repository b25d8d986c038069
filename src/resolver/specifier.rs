//! Syntactic validation of requirement specifiers
//!
//! Only the shape is checked (`name[extras] <op>version, ...; marker` or
//! `name @ url`). Whether versions exist is the solver's business.

use crate::cache::RequirementSet;
use crate::error::{DepcacheError, DepcacheResult};

/// Longest operators first so `===` is not read as `==`
const OPERATORS: &[&str] = &["===", "~=", "==", "!=", "<=", ">=", "<", ">"];

/// Validate every specifier in a set, failing on the first malformed one
pub fn validate_requirements(requirements: &RequirementSet) -> DepcacheResult<()> {
    requirements
        .specifiers()
        .iter()
        .try_for_each(|s| validate_specifier(s))
}

/// Validate one requirement line
pub fn validate_specifier(specifier: &str) -> DepcacheResult<()> {
    let invalid = |reason: &str| DepcacheError::InvalidSpecifier {
        specifier: specifier.to_string(),
        reason: reason.to_string(),
    };

    let line = specifier.trim();
    if line.starts_with('-') {
        // Option lines are passed through to the solver untouched
        return Ok(());
    }

    let (requirement, marker) = match line.split_once(';') {
        Some((r, m)) => (r.trim(), Some(m.trim())),
        None => (line, None),
    };
    if marker == Some("") {
        return Err(invalid("empty environment marker"));
    }

    let name_end = requirement
        .find(|c: char| !is_name_char(c))
        .unwrap_or(requirement.len());
    let name = &requirement[..name_end];
    if name.is_empty() {
        return Err(invalid("missing package name"));
    }
    if !is_valid_name(name) {
        return Err(invalid("package name must start and end with a letter or digit"));
    }

    let mut rest = requirement[name_end..].trim_start();
    if let Some(after_bracket) = rest.strip_prefix('[') {
        let (extras, after) = after_bracket
            .split_once(']')
            .ok_or_else(|| invalid("unclosed extras bracket"))?;
        for extra in extras.split(',').map(str::trim) {
            if !is_valid_name(extra) {
                return Err(invalid("invalid extra name"));
            }
        }
        rest = after.trim_start();
    }

    if let Some(url) = rest.strip_prefix('@') {
        if url.trim().is_empty() {
            return Err(invalid("missing URL after '@'"));
        }
        return Ok(());
    }

    let rest = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .unwrap_or(rest)
        .trim();
    if rest.is_empty() {
        return Ok(());
    }

    for clause in rest.split(',').map(str::trim) {
        let op = OPERATORS
            .iter()
            .find(|op| clause.starts_with(**op))
            .ok_or_else(|| invalid("expected a version operator"))?;
        let version = clause[op.len()..].trim();
        if version.is_empty() {
            return Err(invalid("missing version after operator"));
        }
        if !version.chars().all(is_version_char) {
            return Err(invalid("invalid character in version"));
        }
    }

    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn is_valid_name(name: &str) -> bool {
    let starts = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends = name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    starts && ends && name.chars().all(is_name_char)
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '*' | '+' | '!' | '-' | '_')
}
