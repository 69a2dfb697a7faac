//! Incremental sync orchestrator.
//!
//! Two watches drive the engine while it idles:
//!
//! - the corpus root (recursive, `.md` only) feeds targeted syncs through a
//!   debouncer, so an editor's burst of events becomes one pass per quiet
//!   period. A settled path that still exists is synced; one that is gone is
//!   retracted. A rename therefore surfaces as one retraction plus one sync.
//! - the store file itself triggers community recomputation after external
//!   writes settle, behind the shared writer-active flag so the detector's
//!   own writes never re-trigger it.
//!
//! Maintenance piggybacks on applied changes: every N changes runs a
//! full-text optimize, and a wall-clock interval forces space reclamation.
//! Both are best-effort; their failures are logged, never propagated to the
//! event that scheduled them.

use crate::engine::EngineCore;
use crate::error::{EngineError, Result};
use crate::graph::sync;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// An active watch session. Dropping it stops both watches.
pub struct SyncOrchestrator {
    _corpus: Debouncer<RecommendedWatcher>,
    _store: Option<StoreWatch>,
}

struct StoreWatch {
    _watcher: RecommendedWatcher,
    _debounce_thread: JoinHandle<()>,
}

/// Counters for change-driven maintenance scheduling.
struct MaintenanceState {
    changes_since_optimize: AtomicU64,
    optimize_every: u64,
    last_vacuum: Mutex<Instant>,
    vacuum_interval: Duration,
}

impl MaintenanceState {
    fn new(optimize_every: u64, vacuum_interval: Duration) -> Self {
        Self {
            changes_since_optimize: AtomicU64::new(0),
            optimize_every: optimize_every.max(1),
            last_vacuum: Mutex::new(Instant::now()),
            vacuum_interval,
        }
    }

    /// Record applied changes; run whatever maintenance is due. Failures are
    /// logged and swallowed.
    fn record(&self, core: &EngineCore, applied: u64) {
        let total = self
            .changes_since_optimize
            .fetch_add(applied, Ordering::SeqCst)
            + applied;
        let mut run_optimize = false;
        let mut run_vacuum = false;

        if total >= self.optimize_every {
            self.changes_since_optimize.store(0, Ordering::SeqCst);
            run_optimize = true;
        }

        if self.vacuum_interval > Duration::ZERO {
            let mut last = self.last_vacuum.lock().expect("maintenance lock poisoned");
            if last.elapsed() >= self.vacuum_interval {
                *last = Instant::now();
                run_vacuum = true;
                run_optimize = true;
            }
        }

        if !(run_optimize || run_vacuum) {
            return;
        }

        match core.connection() {
            Ok(conn) => {
                if run_optimize {
                    if let Err(err) = sync::optimize_full_text(&conn) {
                        warn!(error = %err, "scheduled full-text optimize failed");
                    }
                }
                if run_vacuum {
                    if let Err(err) = sync::reclaim_space(&conn) {
                        warn!(error = %err, "scheduled space reclamation failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "maintenance could not open store"),
        }
    }
}

impl SyncOrchestrator {
    /// Start watching the corpus root and the store file.
    pub(crate) fn start(core: Arc<EngineCore>, debounce_ms: Option<u64>) -> Result<Self> {
        let debounce_ms = debounce_ms.unwrap_or(core.config().watcher.debounce_ms);
        if !(10..=10_000).contains(&debounce_ms) {
            return Err(EngineError::invalid(
                "debounce_ms",
                "must be between 10 and 10000 milliseconds",
            ));
        }

        let root = core.config().resolved_root();
        std::fs::create_dir_all(&root)?;

        let maintenance = Arc::new(MaintenanceState::new(
            core.config().watcher.optimize_every,
            Duration::from_secs(core.config().watcher.vacuum_interval_hours * 3600),
        ));

        let corpus_core = core.clone();
        let corpus_maintenance = maintenance.clone();
        let mut corpus = new_debouncer(
            Duration::from_millis(debounce_ms),
            move |result: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    handle_corpus_events(&corpus_core, &corpus_maintenance, events)
                }
                // OS-level watch failures (e.g. overflow) are surfaced, not masked
                Err(err) => error!(error = %err, "corpus watcher error"),
            },
        )?;
        corpus.watcher().watch(&root, RecursiveMode::Recursive)?;

        let store = start_store_watch(core.clone())?;

        info!(
            root = %root.display(),
            debounce_ms,
            "incremental sync watcher started"
        );

        Ok(Self {
            _corpus: corpus,
            _store: store,
        })
    }
}

/// Apply one debounced batch of corpus events as a targeted sync.
fn handle_corpus_events(
    core: &EngineCore,
    maintenance: &MaintenanceState,
    events: Vec<DebouncedEvent>,
) {
    let mut paths: Vec<PathBuf> = events
        .into_iter()
        .map(|event| event.path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();
    paths.dedup();
    if paths.is_empty() {
        return;
    }

    match core.sync_paths(&paths) {
        Ok(report) => {
            debug!(
                paths = paths.len(),
                processed = report.documents_processed,
                removed = report.documents_removed,
                "incremental sync applied"
            );
            maintenance.record(core, paths.len() as u64);
        }
        Err(err) => warn!(error = %err, "incremental sync failed"),
    }
}

/// Watch the store file and recompute communities after writes settle.
///
/// Uses a raw watcher plus a manually re-armed deadline: the writer-active
/// check must happen at raw-event time, before the debounce delay, or the
/// detector's own (already finished) writes would look external.
fn start_store_watch(core: Arc<EngineCore>) -> Result<Option<StoreWatch>> {
    let db_path = core.config().resolved_db_path();
    let Some(db_dir) = db_path.parent().map(PathBuf::from) else {
        return Ok(None);
    };
    if !db_dir.exists() {
        return Ok(None);
    }
    let db_name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (kick_tx, kick_rx) = mpsc::channel::<()>();

    let event_core = core.clone();
    let event_name = db_name.clone();
    let mut watcher = notify::recommended_watcher(
        move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                let touches_store = event.paths.iter().any(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().starts_with(event_name.as_str()))
                        .unwrap_or(false)
                });
                if touches_store && !event_core.community_writer_active() {
                    let _ = kick_tx.send(());
                }
            }
            Err(err) => error!(error = %err, "store watcher error"),
        },
    )?;
    watcher.watch(&db_dir, RecursiveMode::NonRecursive)?;

    let debounce = Duration::from_millis(core.config().watcher.community_debounce_ms);
    let detect_core = core;
    let handle = std::thread::spawn(move || {
        let mut deadline: Option<Instant> = None;
        loop {
            let timeout = deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(3600));
            match kick_rx.recv_timeout(timeout) {
                // Every write re-arms the deadline; detection fires once per
                // quiet period, not once per event
                Ok(()) => deadline = Some(Instant::now() + debounce),
                Err(RecvTimeoutError::Timeout) => {
                    if deadline.take().is_some() {
                        match detect_core.detect_communities() {
                            Ok((count, modularity)) => info!(
                                communities = count,
                                modularity,
                                "community recomputation complete"
                            ),
                            Err(err) => warn!(error = %err, "community recomputation failed"),
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    Ok(Some(StoreWatch {
        _watcher: watcher,
        _debounce_thread: handle,
    }))
}
