//! Single-flight coordination of solver invocations
//!
//! At most one solver call runs per (cache directory, fingerprint). The first
//! caller starts a flight; everyone arriving while it runs awaits the same
//! shared future and sees the same outcome.
//!
//! The in-flight map only holds weak handles. A flight stays alive while at
//! least one caller is awaiting it; when the last waiter goes away the flight
//! is dropped (killing the solver process) and the next caller starts over.
//! Finished flights remove themselves, so failures are never replayed to
//! later callers.

use crate::cache::{Fingerprint, RequirementSet, ResolutionRecord, ResolutionStore};
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::error::{DepcacheError, DepcacheResult};
use crate::resolver::{Pin, Resolver};
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

type FlightOutcome = DepcacheResult<ResolutionRecord>;
type FlightFuture = BoxFuture<'static, FlightOutcome>;

/// Whether a flight may answer from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Return the cached record if there is one
    UseCache,
    /// Always call the solver, then persist
    Force,
}

/// Collaborators a flight needs
#[derive(Clone)]
pub struct FlightContext {
    pub store: ResolutionStore,
    pub resolver: Arc<dyn Resolver>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlightKey {
    dir: PathBuf,
    fingerprint: Fingerprint,
}

struct Flight {
    id: u64,
    outcome: WeakShared<FlightFuture>,
}

/// Per-module results of a bulk re-resolution
#[derive(Debug, Default)]
pub struct BulkReport {
    /// Outcome for every module that was submitted
    pub outcomes: BTreeMap<String, DepcacheResult<Vec<Pin>>>,

    /// Distinct fingerprints resolved
    pub resolutions: usize,
}

impl BulkReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|r| r.is_ok()).count()
    }

    /// Modules that failed, with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&String, &DepcacheError)> {
        self.outcomes
            .iter()
            .filter_map(|(module, r)| r.as_ref().err().map(|e| (module, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Tracks in-flight resolutions
#[derive(Default)]
pub struct ResolutionCoordinator {
    flights: Mutex<HashMap<FlightKey, Flight>>,
    next_id: AtomicU64,
}

impl ResolutionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one requirement set, sharing any flight already running for
    /// the same fingerprint
    pub async fn resolve(
        self: &Arc<Self>,
        ctx: &FlightContext,
        requirements: RequirementSet,
        fingerprint: Fingerprint,
        mode: ResolveMode,
    ) -> FlightOutcome {
        let module = requirements.module().to_string();
        let (flight, joined) = self.join_or_start(ctx, requirements, fingerprint.clone(), mode);

        if joined {
            ctx.diagnostics
                .record(&DiagnosticEvent::FlightJoined {
                    module,
                    fingerprint,
                })
                .await;
        }

        flight.await
    }

    /// Force-resolve many modules with at most `max_concurrent` flights
    ///
    /// Modules with identical requirements share one resolution. One
    /// module's failure never stops the others.
    pub async fn resolve_many(
        self: &Arc<Self>,
        ctx: &FlightContext,
        jobs: Vec<(RequirementSet, Fingerprint)>,
        max_concurrent: usize,
    ) -> BulkReport {
        let mut groups: BTreeMap<Fingerprint, (RequirementSet, Vec<String>)> = BTreeMap::new();
        for (requirements, fingerprint) in jobs {
            let module = requirements.module().to_string();
            groups
                .entry(fingerprint)
                .or_insert_with(|| (requirements, Vec::new()))
                .1
                .push(module);
        }

        let mut report = BulkReport {
            resolutions: groups.len(),
            ..BulkReport::default()
        };
        let mut pending: BTreeSet<String> = BTreeSet::new();

        let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut js: JoinSet<(Vec<String>, DepcacheResult<Vec<Pin>>)> = JoinSet::new();

        for (fingerprint, (requirements, modules)) in groups {
            let permit = match sem.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let err = DepcacheError::BulkTask(format!("semaphore closed: {}", e));
                    for module in modules {
                        report.outcomes.insert(module, Err(err.clone()));
                    }
                    continue;
                }
            };

            debug!(
                "Scheduling {} for {} module(s)",
                fingerprint.short(),
                modules.len()
            );
            pending.extend(modules.iter().cloned());

            let coordinator = Arc::clone(self);
            let ctx = ctx.clone();
            js.spawn(async move {
                let outcome = coordinator
                    .resolve(&ctx, requirements, fingerprint, ResolveMode::Force)
                    .await
                    .map(|record| record.packages);
                drop(permit);
                (modules, outcome)
            });
        }

        while let Some(joined) = js.join_next().await {
            match joined {
                Ok((modules, outcome)) => {
                    for module in modules {
                        pending.remove(&module);
                        report.outcomes.insert(module, outcome.clone());
                    }
                }
                Err(e) => error!("A resolution task panicked: {}", e),
            }
        }

        for module in pending {
            report.outcomes.insert(
                module,
                Err(DepcacheError::BulkTask("resolution task panicked".to_string())),
            );
        }

        report
    }

    /// Number of flights currently running
    pub fn in_flight(&self) -> usize {
        self.lock()
            .values()
            .filter(|f| f.outcome.upgrade().is_some())
            .count()
    }

    fn join_or_start(
        self: &Arc<Self>,
        ctx: &FlightContext,
        requirements: RequirementSet,
        fingerprint: Fingerprint,
        mode: ResolveMode,
    ) -> (Shared<FlightFuture>, bool) {
        let key = FlightKey {
            dir: ctx.store.dir().to_path_buf(),
            fingerprint: fingerprint.clone(),
        };

        let mut flights = self.lock();
        // Flights abandoned by every waiter never reach `finish`
        flights.retain(|_, f| f.outcome.upgrade().is_some());

        if let Some(existing) = flights.get(&key).and_then(|f| f.outcome.upgrade()) {
            return (existing, true);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let coordinator = Arc::clone(self);
        let flight_key = key.clone();
        let ctx = ctx.clone();

        let flight = async move {
            let outcome = run_flight(&ctx, &requirements, &fingerprint, mode).await;
            coordinator.finish(&flight_key, id);
            outcome
        }
        .boxed()
        .shared();

        if let Some(outcome) = flight.downgrade() {
            flights.insert(key, Flight { id, outcome });
        }
        (flight, false)
    }

    /// Drop the map entry unless a newer flight replaced it
    fn finish(&self, key: &FlightKey, id: u64) {
        let mut flights = self.lock();
        if flights.get(key).is_some_and(|f| f.id == id) {
            flights.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_flights(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FlightKey, Flight>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_flight(
    ctx: &FlightContext,
    requirements: &RequirementSet,
    fingerprint: &Fingerprint,
    mode: ResolveMode,
) -> FlightOutcome {
    let outcome = resolve_and_store(ctx, requirements, fingerprint, mode).await;

    if let Err(e) = &outcome {
        ctx.diagnostics
            .record(&DiagnosticEvent::ResolutionFailed {
                module: requirements.module().to_string(),
                fingerprint: fingerprint.clone(),
                error: e.to_string(),
                retryable: e.is_retryable(),
            })
            .await;
    }

    outcome
}

async fn resolve_and_store(
    ctx: &FlightContext,
    requirements: &RequirementSet,
    fingerprint: &Fingerprint,
    mode: ResolveMode,
) -> FlightOutcome {
    let module = requirements.module().to_string();
    let existing = ctx.store.get(fingerprint).await?;

    // A flight that finished just before this one started may have filled
    // the entry already.
    if mode == ResolveMode::UseCache {
        if let Some(record) = existing {
            ctx.diagnostics
                .record(&DiagnosticEvent::CacheHit {
                    module,
                    fingerprint: fingerprint.clone(),
                })
                .await;
            return Ok(record);
        }
    }

    ctx.diagnostics
        .record(&DiagnosticEvent::ResolutionStarted {
            module: module.clone(),
            fingerprint: fingerprint.clone(),
            forced: mode == ResolveMode::Force,
        })
        .await;

    let started = Instant::now();
    let packages = ctx.resolver.resolve(requirements).await?;
    let solver = ctx.resolver.metadata().await;

    let fresh = ResolutionRecord::new(
        fingerprint.clone(),
        &module,
        requirements.normalized(),
        packages,
        solver,
    );

    let (record, written) = match existing {
        Some(old) if old.same_resolution(&fresh) => (old, false),
        Some(old) => {
            let mut fresh = fresh;
            fresh.modules.extend(old.modules);
            ctx.store.put(&fresh).await?;
            (fresh, true)
        }
        None => {
            ctx.store.put(&fresh).await?;
            (fresh, true)
        }
    };

    ctx.diagnostics
        .record(&DiagnosticEvent::ResolutionSucceeded {
            module,
            fingerprint: fingerprint.clone(),
            packages: record.packages.len(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            written,
        })
        .await;

    Ok(record)
}
