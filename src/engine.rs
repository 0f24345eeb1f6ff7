//! Pipeline orchestration.
//!
//! The engine turns file-save events into published [`Snapshot`]s. Each
//! debounced trigger allocates a strictly increasing sequence number and
//! spawns one run task: compile, clean, resolve symbols, analyze, publish.
//! Runs may finish out of order (compile time varies); the publish step is
//! guarded by a monotonic sequence floor, so a late result whose sequence is
//! at or below the published one is silently discarded and the consumer
//! observes a strictly run-ordered series of snapshots.
//!
//! Nothing here terminates on failure: a compile error, an unreadable
//! source, or a dead analyzer all degrade to a failure-flagged snapshot
//! while the watch loop keeps running.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::build_db;
use crate::config::AppConfig;
use crate::demangle::{self, Demangler};
use crate::lexer::{self, FilterOptions};
use crate::perf;
use crate::toolchain::Toolchain;
use crate::watcher::{self, WatchError, WatchSubscription};

/// Shown in place of assembly before the first successful run.
pub const NO_ASSEMBLY_PLACEHOLDER: &str = "(no assembly)";

/// Immutable result of one pipeline run, handed to the consumer whole.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub source_path: PathBuf,
    pub source_code: String,
    /// Final (cleaned, demangled, simplified) assembly text.
    pub assembly: String,
    /// Cleaned line index (0-based) to source line.
    pub line_map: BTreeMap<usize, u32>,
    /// Cleaned line number (1-based) to cycle count.
    pub cycles: BTreeMap<usize, u32>,
    /// Raw performance report, for inspection.
    pub perf_report: String,
    pub diagnostics: String,
    pub success: bool,
    pub sequence: u64,
    pub created_at: SystemTime,
}

impl Snapshot {
    /// Source line for a 0-based assembly line index, if attributed.
    pub fn source_line_for(&self, index: usize) -> Option<u32> {
        self.line_map.get(&index).copied()
    }
}

/// Pipeline stages, in order. Used for run-progress tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Compiling,
    Cleaning,
    Resolving,
    Analyzing,
    Publishing,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Compiling => "compiling",
            RunPhase::Cleaning => "cleaning",
            RunPhase::Resolving => "resolving",
            RunPhase::Analyzing => "analyzing",
            RunPhase::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// Supersession-guarded publish point.
///
/// The floor is the highest sequence number ever published; only snapshots
/// above it go out. Check, floor update, and send happen under one lock, so
/// racing runs cannot interleave their sends out of sequence order: the
/// consumer's view is strictly monotonic.
#[derive(Debug)]
pub struct Publisher {
    tx: mpsc::Sender<Arc<Snapshot>>,
    floor: Mutex<u64>,
}

impl Publisher {
    pub fn new(tx: mpsc::Sender<Arc<Snapshot>>) -> Self {
        Self {
            tx,
            floor: Mutex::new(0),
        }
    }

    /// Publish unless superseded. Returns whether the snapshot went out.
    pub async fn publish(&self, snapshot: Arc<Snapshot>) -> bool {
        let mut floor = self.floor.lock().await;
        if snapshot.sequence <= *floor {
            debug!(
                sequence = snapshot.sequence,
                published = *floor,
                "discarding superseded run"
            );
            return false;
        }
        *floor = snapshot.sequence;
        // A departed consumer is a normal shutdown, not an error.
        let _ = self.tx.send(snapshot).await;
        true
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Window within which a burst of change events coalesces into one run.
    pub debounce: Duration,
    /// Lexer filtering options for every run.
    pub filter: FilterOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            filter: FilterOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// The last successfully published assembly view, reused by failure
/// snapshots so the display stays useful while the user fixes the error.
#[derive(Debug, Default, Clone)]
struct LastGood {
    assembly: String,
    line_map: BTreeMap<usize, u32>,
    cycles: BTreeMap<usize, u32>,
}

struct Shared {
    source: PathBuf,
    config: AppConfig,
    toolchain: Arc<dyn Toolchain>,
    demangler: Arc<dyn Demangler>,
    filter: FilterOptions,
    publisher: Publisher,
    last_good: Mutex<Option<LastGood>>,
}

/// Handle to a running engine. Dropping it stops the supervisor and the
/// watch subscription; in-flight runs finish and their sends go nowhere.
pub struct Engine {
    trigger_tx: mpsc::Sender<()>,
}

impl Engine {
    /// Start the engine: subscribe to the source path, run once
    /// immediately, then serve debounced triggers forever.
    pub fn spawn(
        source: PathBuf,
        config: AppConfig,
        toolchain: Arc<dyn Toolchain>,
        demangler: Arc<dyn Demangler>,
        options: EngineOptions,
    ) -> Result<(Self, mpsc::Receiver<Arc<Snapshot>>), EngineError> {
        let (subscription, watch_rx) = watcher::watch(&source)?;
        Ok(Self::spawn_with_watch(
            source,
            config,
            toolchain,
            demangler,
            options,
            Some(subscription),
            watch_rx,
        ))
    }

    /// Start the engine over an externally supplied event stream. Tests use
    /// this to drive the supervisor without touching the file system's
    /// notification machinery.
    pub fn spawn_with_watch(
        source: PathBuf,
        config: AppConfig,
        toolchain: Arc<dyn Toolchain>,
        demangler: Arc<dyn Demangler>,
        options: EngineOptions,
        subscription: Option<WatchSubscription>,
        mut watch_rx: mpsc::Receiver<watcher::WatchEvent>,
    ) -> (Self, mpsc::Receiver<Arc<Snapshot>>) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(16);
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(16);

        let shared = Arc::new(Shared {
            source,
            config,
            toolchain,
            demangler,
            filter: options.filter,
            publisher: Publisher::new(snapshot_tx),
            last_good: Mutex::new(None),
        });

        let debounce = options.debounce;
        let supervisor_shared = shared.clone();
        tokio::spawn(async move {
            // The subscription must live exactly as long as the supervisor.
            let _subscription = subscription;
            let sequence = AtomicU64::new(0);
            let mut watch_open = true;

            spawn_run(&supervisor_shared, &sequence);

            loop {
                let triggered = tokio::select! {
                    event = watch_rx.recv(), if watch_open => {
                        // A closed watch side leaves manual triggers working.
                        watch_open = event.is_some();
                        event.is_some()
                    }
                    trigger = trigger_rx.recv() => {
                        if trigger.is_none() {
                            debug!("engine handle dropped, supervisor exiting");
                            break;
                        }
                        true
                    }
                };
                if !triggered {
                    continue;
                }

                absorb_burst(&mut watch_rx, &mut trigger_rx, &mut watch_open, debounce).await;
                spawn_run(&supervisor_shared, &sequence);
            }
        });

        (Self { trigger_tx }, snapshot_rx)
    }

    /// Request a recompile regardless of file changes.
    pub async fn refresh(&self) {
        let _ = self.trigger_tx.send(()).await;
    }
}

/// Swallow every event that arrives within the debounce window, so one save
/// (which may surface as several OS-level writes) starts one run.
async fn absorb_burst(
    watch_rx: &mut mpsc::Receiver<watcher::WatchEvent>,
    trigger_rx: &mut mpsc::Receiver<()>,
    watch_open: &mut bool,
    window: Duration,
) {
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(remaining) => return,
            event = watch_rx.recv(), if *watch_open => {
                *watch_open = event.is_some();
            }
            trigger = trigger_rx.recv() => {
                if trigger.is_none() {
                    return;
                }
            }
        }
    }
}

fn spawn_run(shared: &Arc<Shared>, sequence: &AtomicU64) {
    let sequence = sequence.fetch_add(1, Ordering::AcqRel) + 1;
    let shared = shared.clone();
    tokio::spawn(async move {
        execute_run(&shared, sequence).await;
    });
}

async fn execute_run(shared: &Shared, sequence: u64) {
    let snapshot = Arc::new(build_snapshot(shared, sequence).await);
    debug!(sequence, phase = %RunPhase::Publishing, success = snapshot.success, "run finished");
    let published = shared.publisher.publish(snapshot.clone()).await;
    if published && snapshot.success {
        let mut last_good = shared.last_good.lock().await;
        *last_good = Some(LastGood {
            assembly: snapshot.assembly.clone(),
            line_map: snapshot.line_map.clone(),
            cycles: snapshot.cycles.clone(),
        });
    }
}

async fn build_snapshot(shared: &Shared, sequence: u64) -> Snapshot {
    let source_code = match tokio::fs::read_to_string(&shared.source).await {
        Ok(code) => code,
        Err(err) => {
            warn!(source = %shared.source.display(), %err, "source unreadable");
            return failure_snapshot(
                shared,
                sequence,
                String::new(),
                format!("cannot read {}: {err}", shared.source.display()),
            )
            .await;
        }
    };

    debug!(sequence, phase = %RunPhase::Compiling, "run started");
    let flags = collect_flags(shared);
    let compiled = match shared.toolchain.compile(&shared.source, &flags).await {
        Ok(output) => output,
        Err(err) => {
            return failure_snapshot(shared, sequence, source_code, err.to_string()).await;
        }
    };
    if !compiled.success {
        return failure_snapshot(shared, sequence, source_code, compiled.diagnostics).await;
    }

    debug!(sequence, phase = %RunPhase::Cleaning, "compile ok");
    let source_filename = shared.source.to_str();
    let cleaned = lexer::clean(&compiled.assembly, source_filename, &shared.filter);

    debug!(sequence, phase = %RunPhase::Resolving, lines = cleaned.len(), "cleaned");
    let assembly = demangle::resolve_and_simplify(&cleaned.text(), shared.demangler.as_ref()).await;

    debug!(sequence, phase = %RunPhase::Analyzing, "resolved");
    let perf_report = match shared.toolchain.analyze(&assembly).await {
        Ok(report) => report,
        Err(err) => {
            warn!(sequence, %err, "analysis failed, continuing without cycles");
            String::new()
        }
    };
    let stats = perf::parse_report(&perf_report);
    let cycles = perf::annotate_cycles(&stats, cleaned.len());

    Snapshot {
        source_path: shared.source.clone(),
        source_code,
        assembly,
        line_map: cleaned.line_map().clone(),
        cycles,
        perf_report,
        diagnostics: compiled.diagnostics,
        success: true,
        sequence,
        created_at: SystemTime::now(),
    }
}

/// Failure snapshots keep the last successfully published assembly view so
/// the display does not go blank on every typo.
async fn failure_snapshot(
    shared: &Shared,
    sequence: u64,
    source_code: String,
    diagnostics: String,
) -> Snapshot {
    let last_good = shared.last_good.lock().await.clone().unwrap_or_else(|| LastGood {
        assembly: NO_ASSEMBLY_PLACEHOLDER.to_string(),
        ..LastGood::default()
    });
    Snapshot {
        source_path: shared.source.clone(),
        source_code,
        assembly: last_good.assembly,
        line_map: last_good.line_map,
        cycles: last_good.cycles,
        perf_report: String::new(),
        diagnostics,
        success: false,
        sequence,
        created_at: SystemTime::now(),
    }
}

fn collect_flags(shared: &Shared) -> Vec<String> {
    let mut flags = Vec::with_capacity(shared.config.flags.len() + 1);
    flags.push(shared.config.opt_level.clone());
    flags.extend(shared.config.flags.iter().cloned());
    if let Some(db) = build_db::find_database(&shared.source) {
        flags.extend(build_db::flags_for(&shared.source, &db));
    }
    flags
}
