//! Diagnostics sinks for cache and resolution events
//!
//! Every facade call accepts a sink; when none is given the manager's default
//! (normally [`TracingSink`]) is used. [`JsonlSink`] appends one JSON object
//! per event, for tooling that wants a machine-readable trail.

use crate::cache::Fingerprint;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Something worth reporting about a resolution or the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    CacheHit {
        module: String,
        fingerprint: Fingerprint,
    },
    CacheMiss {
        module: String,
        fingerprint: Fingerprint,
    },
    /// A caller attached to a resolution already in flight
    FlightJoined {
        module: String,
        fingerprint: Fingerprint,
    },
    ResolutionStarted {
        module: String,
        fingerprint: Fingerprint,
        forced: bool,
    },
    ResolutionSucceeded {
        module: String,
        fingerprint: Fingerprint,
        packages: usize,
        elapsed_ms: u64,
        written: bool,
    },
    ResolutionFailed {
        module: String,
        fingerprint: Fingerprint,
        error: String,
        retryable: bool,
    },
    Invalidated {
        scope: String,
        removed: usize,
    },
    BulkCompleted {
        succeeded: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}

impl DiagnosticEvent {
    /// Dotted event name, e.g. `cache.hit`
    pub fn name(&self) -> &'static str {
        match self {
            Self::CacheHit { .. } => "cache.hit",
            Self::CacheMiss { .. } => "cache.miss",
            Self::FlightJoined { .. } => "resolution.joined",
            Self::ResolutionStarted { .. } => "resolution.started",
            Self::ResolutionSucceeded { .. } => "resolution.succeeded",
            Self::ResolutionFailed { .. } => "resolution.failed",
            Self::Invalidated { .. } => "cache.invalidated",
            Self::BulkCompleted { .. } => "bulk.completed",
        }
    }
}

/// Receiver of diagnostic events
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    /// Record one event. Must not fail the calling operation.
    async fn record(&self, event: &DiagnosticEvent);
}

/// Process-wide default sink: forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl DiagnosticSink for TracingSink {
    async fn record(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::CacheHit {
                module,
                fingerprint,
            } => debug!("Cache hit for {} ({})", module, fingerprint.short()),
            DiagnosticEvent::CacheMiss {
                module,
                fingerprint,
            } => debug!("Cache miss for {} ({})", module, fingerprint.short()),
            DiagnosticEvent::FlightJoined {
                module,
                fingerprint,
            } => debug!(
                "Waiting on in-flight resolution {} for {}",
                fingerprint.short(),
                module
            ),
            DiagnosticEvent::ResolutionStarted {
                module,
                fingerprint,
                forced,
            } => info!(
                "Resolving {} ({}{})",
                module,
                fingerprint.short(),
                if *forced { ", forced" } else { "" }
            ),
            DiagnosticEvent::ResolutionSucceeded {
                module,
                packages,
                elapsed_ms,
                written,
                ..
            } => info!(
                "Resolved {}: {} packages in {}ms{}",
                module,
                packages,
                elapsed_ms,
                if *written { "" } else { " (unchanged)" }
            ),
            DiagnosticEvent::ResolutionFailed { module, error, .. } => {
                warn!("Resolution failed for {}: {}", module, error)
            }
            DiagnosticEvent::Invalidated { scope, removed } => {
                info!("Invalidated {} cache entries ({})", removed, scope)
            }
            DiagnosticEvent::BulkCompleted {
                succeeded,
                failed,
                elapsed_ms,
            } => {
                if *failed == 0 {
                    info!(
                        "Re-resolved {} modules in {}ms",
                        succeeded, elapsed_ms
                    )
                } else {
                    warn!(
                        "Re-resolution finished with {} failures ({} succeeded) in {}ms",
                        failed, succeeded, elapsed_ms
                    )
                }
            }
        }
    }
}

/// File sink that appends JSON lines
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl DiagnosticSink for JsonlSink {
    /// Drops the event on IO failure; diagnostics never break resolution.
    async fn record(&self, event: &DiagnosticEvent) {
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event.name(),
            "data": event,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize diagnostics event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write diagnostics log: {}", e);
        }
    }
}

/// Sends each event to several sinks in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn DiagnosticSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl DiagnosticSink for FanoutSink {
    async fn record(&self, event: &DiagnosticEvent) {
        for sink in &self.sinks {
            sink.record(event).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use crate::cache::{fingerprint, RequirementSet};
    use tempfile::TempDir;

    fn hit() -> DiagnosticEvent {
        DiagnosticEvent::CacheHit {
            module: "mymodule".to_string(),
            fingerprint: fingerprint(&RequirementSet::parse("mymodule", "x==1.0")),
        }
    }

    #[tokio::test]
    async fn jsonl_writes_json_line() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path().join("logs").join("diagnostics.jsonl"));

        sink.record(&hit()).await;

        let content = tokio::fs::read_to_string(&sink.path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert_eq!(parsed["event"], "cache.hit");
        assert_eq!(parsed["data"]["kind"], "cache_hit");
        assert_eq!(parsed["data"]["module"], "mymodule");
        assert!(parsed["timestamp"].is_string());
    }

    #[tokio::test]
    async fn jsonl_appends_multiple_lines() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path().join("diagnostics.jsonl"));

        sink.record(&hit()).await;
        sink.record(&DiagnosticEvent::Invalidated {
            scope: "all".to_string(),
            removed: 3,
        })
        .await;

        let content = tokio::fs::read_to_string(&sink.path).await.unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("cache.invalidated"));
    }

    #[tokio::test]
    async fn fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let sinks: Vec<Arc<dyn DiagnosticSink>> = vec![a.clone(), b.clone(), Arc::new(TracingSink)];
        let fanout = FanoutSink::new(sinks);

        fanout.record(&hit()).await;

        assert_eq!(a.count("cache.hit"), 1);
        assert_eq!(b.count("cache.hit"), 1);
    }
}
