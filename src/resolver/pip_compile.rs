//! pip-compile backed resolver
//!
//! Feeds the requirement set to `pip-compile` on stdin and reads the
//! compiled lock from stdout. Requires pip-tools on PATH (or a configured
//! command).

use crate::cache::{canonicalize_name, RequirementSet};
use crate::config::schema::ResolverConfig;
use crate::error::{DepcacheError, DepcacheResult};
use crate::resolver::specifier::validate_requirements;
use crate::resolver::{Pin, Resolver, SolverMetadata};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::debug;

/// Max number of solver output lines to include in error messages.
const ERROR_TAIL_LINES: usize = 20;

/// Output fragments pip reports when no consistent pin set exists
const UNSATISFIABLE_MARKERS: &[&str] = &[
    "ResolutionImpossible",
    "Could not find a version that satisfies",
    "No matching distribution found",
    "conflicting dependencies",
];

/// Output fragments pip reports when the package index cannot be reached.
/// pip also prints "No matching distribution found" in that case, so these
/// are checked before the unsatisfiable markers.
const CONNECTIVITY_MARKERS: &[&str] = &[
    "NewConnectionError",
    "Failed to establish a new connection",
    "Temporary failure in name resolution",
    "Max retries exceeded",
    "ConnectTimeout",
    "ConnectionError",
    "SSLError",
];

const INVALID_REQUIREMENT_MARKERS: &[&str] = &["InvalidRequirement", "Invalid requirement"];

/// Solver using pip-tools' `pip-compile`
pub struct PipCompileResolver {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    version: OnceCell<String>,
}

impl PipCompileResolver {
    /// Create a resolver from configuration
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            version: OnceCell::new(),
        }
    }

    /// Ask the solver for its version once, "unknown" if it won't say
    async fn detect_version(&self) -> String {
        let output = Command::new(&self.command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match timeout(self.timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                // "pip-compile, version 7.4.1"
                String::from_utf8_lossy(&out.stdout)
                    .split_whitespace()
                    .last()
                    .map(str::to_string)
                    .unwrap_or_else(|| "unknown".to_string())
            }
            _ => "unknown".to_string(),
        }
    }

    fn classify_failure(
        &self,
        requirements: &RequirementSet,
        output: &std::process::Output,
    ) -> DepcacheError {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = error_tail(&stdout, &stderr);
        let mentions = |markers: &[&str]| {
            markers
                .iter()
                .any(|m| stderr.contains(m) || stdout.contains(m))
        };

        if mentions(CONNECTIVITY_MARKERS) {
            return DepcacheError::solver_unavailable(
                &self.command,
                format!("package index unreachable: {}", detail),
            );
        }

        if mentions(INVALID_REQUIREMENT_MARKERS) {
            return DepcacheError::InvalidSpecifier {
                specifier: requirements.specifiers().join(", "),
                reason: detail,
            };
        }

        if mentions(UNSATISFIABLE_MARKERS) {
            return DepcacheError::Unsatisfiable {
                module: requirements.module().to_string(),
                detail,
            };
        }

        let reason = match output.status.code() {
            Some(code) => format!("exited with code {}: {}", code, detail),
            None => "terminated by signal".to_string(),
        };
        DepcacheError::solver_unavailable(&self.command, reason)
    }
}

#[async_trait]
impl Resolver for PipCompileResolver {
    async fn resolve(&self, requirements: &RequirementSet) -> DepcacheResult<Vec<Pin>> {
        validate_requirements(requirements)?;

        if requirements.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Executing: {} {:?} for {}",
            self.command,
            self.args,
            requirements.module()
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .args([
                "--quiet",
                "--no-header",
                "--no-annotate",
                "--strip-extras",
                "--output-file",
                "-",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let reason = if e.kind() == ErrorKind::NotFound {
                    "command not found".to_string()
                } else {
                    e.to_string()
                };
                DepcacheError::solver_unavailable(&self.command, reason)
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DepcacheError::Internal("solver stdin not piped".to_string()))?;
        let input = requirements.to_text();

        let run = async move {
            stdin.write_all(input.as_bytes()).await?;
            drop(stdin);
            child.wait_with_output().await
        };

        let output = timeout(self.timeout, run)
            .await
            .map_err(|_| {
                DepcacheError::solver_unavailable(
                    &self.command,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| DepcacheError::solver_unavailable(&self.command, e.to_string()))?;

        if !output.status.success() {
            return Err(self.classify_failure(requirements, &output));
        }

        let pins = parse_lock_output(&String::from_utf8_lossy(&output.stdout));
        debug!("{} resolved {} pins", self.command, pins.len());
        Ok(pins)
    }

    fn environment(&self) -> String {
        format!(
            "pip-compile:{}/{}/{}",
            self.command,
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }

    async fn metadata(&self) -> SolverMetadata {
        let version = self
            .version
            .get_or_init(|| self.detect_version())
            .await
            .clone();
        SolverMetadata {
            name: "pip-compile".to_string(),
            version,
        }
    }
}

/// Parse `name==version` lines of a compiled lock, in order
///
/// Comments, option lines and hash continuations are skipped. Direct URL
/// references keep the URL as their version.
pub fn parse_lock_output(output: &str) -> Vec<Pin> {
    output
        .lines()
        .map(|line| line.split(" #").next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .filter_map(|line| {
            let requirement = line.split(';').next().unwrap_or_default().trim();
            let requirement = requirement.trim_end_matches('\\').trim();

            if let Some((name, version)) = requirement.split_once("==") {
                let name = name.split('[').next().unwrap_or_default().trim();
                Some(Pin::new(canonicalize_name(name), version.trim()))
            } else if let Some((name, url)) = requirement.split_once(" @ ") {
                let name = name.split('[').next().unwrap_or_default().trim();
                Some(Pin::new(canonicalize_name(name), url.trim()))
            } else {
                None
            }
        })
        .collect()
}

/// Last `ERROR_TAIL_LINES` lines of combined solver output
fn error_tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(command: &str) -> PipCompileResolver {
        PipCompileResolver::new(&ResolverConfig {
            command: command.to_string(),
            args: vec![],
            timeout_secs: 5,
        })
    }

    #[test]
    fn parse_plain_lock() {
        let out = "\
certifi==2023.7.22
charset-normalizer==3.3.0
Requests==2.31.0
";
        let pins = parse_lock_output(out);
        assert_eq!(
            pins,
            vec![
                Pin::new("certifi", "2023.7.22"),
                Pin::new("charset-normalizer", "3.3.0"),
                Pin::new("requests", "2.31.0"),
            ]
        );
    }

    #[test]
    fn parse_skips_comments_options_and_hashes() {
        let out = "\
#
# This file is autogenerated by pip-compile
#
--index-url https://pypi.org/simple

packaging==23.1  # via -r -
requests[socks]==2.31.0 \\
    --hash=sha256:abc
pywin32==306 ; sys_platform == \"win32\"
mypkg @ https://example.com/mypkg-1.0.tar.gz
";
        let pins = parse_lock_output(out);
        assert_eq!(
            pins,
            vec![
                Pin::new("packaging", "23.1"),
                Pin::new("requests", "2.31.0"),
                Pin::new("pywin32", "306"),
                Pin::new("mypkg", "https://example.com/mypkg-1.0.tar.gz"),
            ]
        );
    }

    #[test]
    fn tail_keeps_last_lines() {
        let stderr: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = error_tail("", &stderr);
        assert_eq!(tail.lines().count(), ERROR_TAIL_LINES);
        assert!(tail.ends_with("line 49"));
    }

    #[tokio::test]
    async fn missing_command_is_solver_unavailable() {
        let resolver = resolver_with("depcache-no-such-solver-binary");
        let set = RequirementSet::parse("m", "requests>=2.25.0");
        let err = resolver.resolve(&set).await.unwrap_err();
        assert!(matches!(err, DepcacheError::SolverUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn invalid_specifier_rejected_before_spawn() {
        let resolver = resolver_with("depcache-no-such-solver-binary");
        let set = RequirementSet::parse("m", "requests>>=2");
        let err = resolver.resolve(&set).await.unwrap_err();
        assert!(matches!(err, DepcacheError::InvalidSpecifier { .. }));
    }

    #[tokio::test]
    async fn empty_set_needs_no_solver() {
        let resolver = resolver_with("depcache-no-such-solver-binary");
        let set = RequirementSet::parse("m", "# nothing\n");
        assert!(resolver.resolve(&set).await.unwrap().is_empty());
    }

    #[test]
    fn environment_tag_names_command_without_running_it() {
        let tag = resolver_with("depcache-no-such-solver-binary").environment();
        assert!(tag.starts_with("pip-compile:depcache-no-such-solver-binary/"));
        assert!(tag.ends_with(std::env::consts::ARCH));
    }

    #[tokio::test]
    async fn unknown_version_when_solver_missing() {
        let resolver = resolver_with("depcache-no-such-solver-binary");
        let meta = resolver.metadata().await;
        assert_eq!(meta.name, "pip-compile");
        assert_eq!(meta.version, "unknown");
    }

    #[cfg(unix)]
    mod failures {
        use super::*;
        use crate::resolver::testing::{lock_solver, script_solver};
        use std::os::unix::process::ExitStatusExt;
        use std::process::{ExitStatus, Output};
        use tempfile::TempDir;

        fn failed(code: i32, stderr: &str) -> Output {
            Output {
                status: ExitStatus::from_raw(code << 8),
                stdout: vec![],
                stderr: stderr.as_bytes().to_vec(),
            }
        }

        fn set() -> RequirementSet {
            RequirementSet::parse("m", "requests>=2.25.0")
        }

        #[test]
        fn unsatisfiable_output() {
            let err = resolver_with("pip-compile").classify_failure(
                &set(),
                &failed(
                    1,
                    "ERROR: Cannot install requests because these package versions have conflicting dependencies.\nResolutionImpossible",
                ),
            );
            assert!(matches!(err, DepcacheError::Unsatisfiable { ref module, .. } if module == "m"));
            assert!(!err.is_retryable());
        }

        #[test]
        fn invalid_requirement_output() {
            let err = resolver_with("pip-compile").classify_failure(
                &set(),
                &failed(2, "pip._vendor.packaging.requirements.InvalidRequirement: Expected end"),
            );
            assert!(matches!(err, DepcacheError::InvalidSpecifier { .. }));
        }

        #[test]
        fn offline_index_is_not_unsatisfiable() {
            let stderr = "\
WARNING: Retrying (Retry(total=4)) after connection broken by 'NewConnectionError(\"Failed to establish a new connection: [Errno -3] Temporary failure in name resolution\")': /simple/requests/
ERROR: Could not find a version that satisfies the requirement requests>=2.25.0 (from versions: none)
ERROR: No matching distribution found for requests>=2.25.0";
            let err = resolver_with("pip-compile").classify_failure(&set(), &failed(1, stderr));
            assert!(matches!(err, DepcacheError::SolverUnavailable { .. }));
            assert!(err.is_retryable());
            assert!(err.to_string().contains("package index unreachable"));
        }

        #[test]
        fn plain_nonzero_exit() {
            let err = resolver_with("pip-compile")
                .classify_failure(&set(), &failed(3, "Traceback (most recent call last):\nKeyError"));
            assert!(matches!(err, DepcacheError::SolverUnavailable { .. }));
            assert!(err.to_string().contains("exited with code 3"));
        }

        #[test]
        fn killed_by_signal() {
            let output = Output {
                status: ExitStatus::from_raw(9),
                stdout: vec![],
                stderr: vec![],
            };
            let err = resolver_with("pip-compile").classify_failure(&set(), &output);
            assert!(err.to_string().contains("terminated by signal"));
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn script_solver_lock_is_parsed() {
            let temp = TempDir::new().unwrap();
            let solver = lock_solver(temp.path(), "solver", "certifi==2023.7.22 requests==2.31.0");
            let resolver = resolver_with(&solver.to_string_lossy());

            let pins = resolver.resolve(&set()).await.unwrap();
            assert_eq!(
                pins,
                vec![
                    Pin::new("certifi", "2023.7.22"),
                    Pin::new("requests", "2.31.0")
                ]
            );
            assert_eq!(resolver.metadata().await.version, "7.4.1");
        }

        #[tokio::test]
        async fn script_solver_failure_is_classified() {
            let temp = TempDir::new().unwrap();
            let solver = script_solver(
                temp.path(),
                "solver",
                "cat > /dev/null\necho 'ERROR: ResolutionImpossible' >&2\nexit 1",
            );
            let err = resolver_with(&solver.to_string_lossy())
                .resolve(&set())
                .await
                .unwrap_err();
            assert!(matches!(err, DepcacheError::Unsatisfiable { .. }));
        }

        #[tokio::test]
        async fn hanging_solver_times_out() {
            let temp = TempDir::new().unwrap();
            let solver = script_solver(temp.path(), "solver", "exec sleep 30");
            let resolver = PipCompileResolver::new(&ResolverConfig {
                command: solver.to_string_lossy().into_owned(),
                args: vec![],
                timeout_secs: 1,
            });

            let outcome = tokio::time::timeout(Duration::from_secs(10), async {
                let err = resolver.resolve(&set()).await.unwrap_err();
                let meta = resolver.metadata().await;
                (err, meta)
            })
            .await
            .expect("solver timeout not enforced");

            assert!(matches!(outcome.0, DepcacheError::SolverUnavailable { .. }));
            assert!(outcome.0.to_string().contains("timed out after 1s"));
            assert_eq!(outcome.1.version, "unknown");
        }
    }
}
