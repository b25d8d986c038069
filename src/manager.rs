//! Dependency manager facade
//!
//! Public entry points for resolving, bulk re-resolving and invalidating.
//! Defaults live in [`ManagerConfig`]; each call may override the cache
//! directory, diagnostics sink and bulk concurrency through [`CallOptions`].

use crate::cache::{
    fingerprint_with_environment, CacheStats, Fingerprint, RequirementSet, ResolutionRecord,
    ResolutionStore,
};
use crate::config::{Config, ConfigManager};
use crate::coordinator::{BulkReport, FlightContext, ResolutionCoordinator, ResolveMode};
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, TracingSink};
use crate::error::{DepcacheError, DepcacheResult};
use crate::resolver::{Pin, Resolver};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Fallback bulk concurrency when the CPU count is unknown
const FALLBACK_MAX_CONCURRENT: usize = 4;

/// Default bulk concurrency: one solver process per available CPU
pub fn default_max_concurrent() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(FALLBACK_MAX_CONCURRENT)
}

/// Process-wide defaults for the facade
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Cache directory used when a call does not name one
    pub cache_dir: PathBuf,

    /// Maximum concurrent solver invocations during bulk re-resolution
    pub max_concurrent: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_dir: ConfigManager::default_cache_dir(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl ManagerConfig {
    /// Defaults overlaid with values from a loaded config file
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: config.cache.dir.clone().unwrap_or(defaults.cache_dir),
            max_concurrent: config
                .bulk
                .max_concurrent
                .unwrap_or(defaults.max_concurrent)
                .max(1),
        }
    }
}

/// Per-call overrides of the manager defaults
#[derive(Clone, Default)]
pub struct CallOptions {
    pub cache_dir: Option<PathBuf>,
    pub diagnostics: Option<Arc<dyn DiagnosticSink>>,
    pub max_concurrent: Option<usize>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = Some(n);
        self
    }
}

/// Handle on a background bulk re-resolution
///
/// Dropping the handle detaches from the work; it does not cancel it.
pub struct BulkHandle {
    task: JoinHandle<DepcacheResult<BulkReport>>,
}

impl BulkHandle {
    /// Wait for every module to finish
    pub async fn wait(self) -> DepcacheResult<BulkReport> {
        self.task
            .await
            .map_err(|e| DepcacheError::BulkTask(e.to_string()))?
    }
}

/// Caching, deduplicating front end to a [`Resolver`]
#[derive(Clone)]
pub struct DependencyManager {
    resolver: Arc<dyn Resolver>,
    config: ManagerConfig,
    diagnostics: Arc<dyn DiagnosticSink>,
    coordinator: Arc<ResolutionCoordinator>,
    /// Serializes read-modify-write of an entry's module list
    module_updates: Arc<Mutex<()>>,
}

impl DependencyManager {
    /// Create a manager reporting to the tracing sink
    pub fn new(resolver: Arc<dyn Resolver>, config: ManagerConfig) -> Self {
        Self {
            resolver,
            config,
            diagnostics: Arc::new(TracingSink),
            coordinator: Arc::new(ResolutionCoordinator::new()),
            module_updates: Arc::new(Mutex::new(())),
        }
    }

    /// Replace the default diagnostics sink
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Cache directory a call would use
    pub fn cache_dir(&self, opts: &CallOptions) -> PathBuf {
        opts.cache_dir
            .clone()
            .unwrap_or_else(|| self.config.cache_dir.clone())
    }

    /// Fingerprint of a module's requirements under the current solver
    pub fn fingerprint_for(&self, module: &str, requirement_text: &str) -> Fingerprint {
        let requirements = RequirementSet::parse(module, requirement_text);
        self.fingerprint(&requirements)
    }

    /// Resolve one module, answering from the cache when possible
    pub async fn resolve_module_dependencies(
        &self,
        module: &str,
        requirement_text: &str,
        opts: &CallOptions,
    ) -> DepcacheResult<Vec<Pin>> {
        let ctx = self.context(opts).await?;
        let requirements = RequirementSet::parse(module, requirement_text);
        let fingerprint = self.fingerprint(&requirements);

        if let Some(record) = ctx.store.get(&fingerprint).await? {
            ctx.diagnostics
                .record(&DiagnosticEvent::CacheHit {
                    module: module.to_string(),
                    fingerprint,
                })
                .await;
            self.note_module(&ctx.store, &record, module).await;
            return Ok(record.packages);
        }

        ctx.diagnostics
            .record(&DiagnosticEvent::CacheMiss {
                module: module.to_string(),
                fingerprint: fingerprint.clone(),
            })
            .await;

        let record = self
            .coordinator
            .resolve(&ctx, requirements, fingerprint, ResolveMode::UseCache)
            .await?;
        self.note_module(&ctx.store, &record, module).await;
        Ok(record.packages)
    }

    /// Re-resolve many modules in the background, bypassing cached reads
    ///
    /// Must be called within a tokio runtime. Completion is reported to the
    /// diagnostics sink; the returned handle yields per-module outcomes.
    pub fn re_resolve_dependencies(
        &self,
        modules_requirements: BTreeMap<String, String>,
        opts: &CallOptions,
    ) -> BulkHandle {
        let task = tokio::spawn(self.clone().run_bulk(modules_requirements, opts.clone()));
        BulkHandle { task }
    }

    async fn run_bulk(
        self,
        modules_requirements: BTreeMap<String, String>,
        opts: CallOptions,
    ) -> DepcacheResult<BulkReport> {
        let started = Instant::now();
        let ctx = self.context(&opts).await?;
        let max_concurrent = opts.max_concurrent.unwrap_or(self.config.max_concurrent);

        let mut jobs = Vec::with_capacity(modules_requirements.len());
        for (module, text) in &modules_requirements {
            let requirements = RequirementSet::parse(module.as_str(), text);
            let fingerprint = self.fingerprint(&requirements);
            jobs.push((requirements, fingerprint.clone()));
        }
        let fingerprints: BTreeMap<String, Fingerprint> = jobs
            .iter()
            .map(|(set, fp)| (set.module().to_string(), fp.clone()))
            .collect();

        let report = self
            .coordinator
            .resolve_many(&ctx, jobs, max_concurrent)
            .await;

        // Modules that shared a resolution with another module
        for (module, outcome) in &report.outcomes {
            if let (Ok(_), Some(fp)) = (outcome, fingerprints.get(module)) {
                self.attach_module(&ctx.store, fp, module).await;
            }
        }

        ctx.diagnostics
            .record(&DiagnosticEvent::BulkCompleted {
                succeeded: report.succeeded(),
                failed: report.failures().count(),
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            })
            .await;

        Ok(report)
    }

    /// Remove one cached fingerprint, or every entry when `None`
    pub async fn invalidate_dependency_cache(
        &self,
        fingerprint: Option<&Fingerprint>,
        opts: &CallOptions,
    ) -> DepcacheResult<usize> {
        let ctx = self.context(opts).await?;
        let removed = ctx.store.invalidate(fingerprint).await?;

        ctx.diagnostics
            .record(&DiagnosticEvent::Invalidated {
                scope: fingerprint
                    .map(|fp| fp.to_string())
                    .unwrap_or_else(|| "all".to_string()),
                removed,
            })
            .await;
        Ok(removed)
    }

    /// Remove every entry recorded for a module
    pub async fn invalidate_module_cache(
        &self,
        module: &str,
        opts: &CallOptions,
    ) -> DepcacheResult<usize> {
        let ctx = self.context(opts).await?;
        let removed = ctx.store.invalidate_module(module).await?;

        ctx.diagnostics
            .record(&DiagnosticEvent::Invalidated {
                scope: format!("module:{}", module),
                removed,
            })
            .await;
        Ok(removed)
    }

    /// Remove entries older than `days` days
    pub async fn prune_dependency_cache(&self, days: u32, opts: &CallOptions) -> DepcacheResult<usize> {
        let ctx = self.context(opts).await?;
        let removed = ctx.store.prune_older_than(days).await?;

        ctx.diagnostics
            .record(&DiagnosticEvent::Invalidated {
                scope: format!("older-than:{}d", days),
                removed,
            })
            .await;
        Ok(removed)
    }

    /// Cached records, newest first
    pub async fn cache_entries(&self, opts: &CallOptions) -> DepcacheResult<Vec<ResolutionRecord>> {
        self.context(opts).await?.store.list().await
    }

    pub async fn cache_stats(&self, opts: &CallOptions) -> DepcacheResult<CacheStats> {
        self.context(opts).await?.store.stats().await
    }

    fn fingerprint(&self, requirements: &RequirementSet) -> Fingerprint {
        fingerprint_with_environment(requirements, &self.resolver.environment())
    }

    async fn note_module(&self, store: &ResolutionStore, record: &ResolutionRecord, module: &str) {
        if !record.modules.contains(module) {
            self.attach_module(store, &record.fingerprint, module).await;
        }
    }

    /// Add `module` to an entry's module list
    ///
    /// The pins are already in hand, so a failed update is only logged.
    async fn attach_module(&self, store: &ResolutionStore, fingerprint: &Fingerprint, module: &str) {
        let _guard = self.module_updates.lock().await;
        if let Err(e) = store.add_module(fingerprint, module).await {
            warn!(
                "Could not record {} on cache entry {}: {}",
                module,
                fingerprint.short(),
                e
            );
        }
    }

    async fn context(&self, opts: &CallOptions) -> DepcacheResult<FlightContext> {
        let store = ResolutionStore::open(self.cache_dir(opts)).await?;
        Ok(FlightContext {
            store,
            resolver: Arc::clone(&self.resolver),
            diagnostics: opts
                .diagnostics
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.diagnostics)),
        })
    }
}
