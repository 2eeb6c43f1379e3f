//! File watcher: OS notifications feed a debounced, bounded pending set;
//! coalesced events dispatch per-file re-indexing on the runtime.
//!
//! Semantics: events for the same path coalesce within the debounce window
//! (last event wins), per-path dispatch order follows coalesced event order,
//! and when the pending set overflows the oldest non-delete entries are shed
//! first. Deletes are never dropped. On shutdown, queued events are drained
//! without dispatch; an in-flight re-index completes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::application::use_cases::IndexDirectoryUseCase;
use crate::domain::EngineError;

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub debounce_ms: u64,
    pub queue_cap: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            queue_cap: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Upsert,
    Remove,
}

#[derive(Debug, Clone)]
struct PendingEvent {
    kind: PendingKind,
    at: Instant,
    seq: u64,
}

/// Running watcher; dropping it (or calling [`WatchService::shutdown`])
/// stops observation and drains the queue without dispatch.
pub struct WatchService {
    _watcher: RecommendedWatcher,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl WatchService {
    pub fn start(
        root: PathBuf,
        repo_id: i64,
        dispatcher: Arc<IndexDirectoryUseCase>,
        options: WatchOptions,
        runtime: tokio::runtime::Handle,
    ) -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| EngineError::internal(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| EngineError::internal(format!("Failed to watch {:?}: {}", root, e)))?;
        info!("Watching {:?}", root);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = std::thread::spawn(move || {
            debounce_loop(rx, root, repo_id, dispatcher, options, runtime, stop_flag);
        });

        Ok(Self {
            _watcher: watcher,
            stop,
            thread: Some(thread),
        })
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn debounce_loop(
    rx: mpsc::Receiver<Event>,
    root: PathBuf,
    repo_id: i64,
    dispatcher: Arc<IndexDirectoryUseCase>,
    options: WatchOptions,
    runtime: tokio::runtime::Handle,
    stop: Arc<AtomicBool>,
) {
    let debounce = Duration::from_millis(options.debounce_ms);
    let mut pending: HashMap<PathBuf, PendingEvent> = HashMap::new();
    let mut seq = 0u64;

    loop {
        if stop.load(Ordering::Relaxed) {
            // Drain without dispatch.
            pending.clear();
            return;
        }

        match rx.recv_timeout(debounce.min(Duration::from_millis(50))) {
            Ok(event) => {
                let kind = event.kind;
                if !matches!(
                    kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    continue;
                }
                for path in event.paths {
                    seq += 1;
                    enqueue(&mut pending, path, &kind, seq, options.queue_cap);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }

        // Dispatch entries older than the debounce window, in coalesced
        // event order.
        let cutoff = Instant::now() - debounce;
        let mut ready: Vec<(PathBuf, PendingEvent)> = pending
            .iter()
            .filter(|(_, e)| e.at <= cutoff)
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        ready.sort_by_key(|(_, e)| e.seq);

        for (path, event) in ready {
            pending.remove(&path);
            if stop.load(Ordering::Relaxed) {
                pending.clear();
                return;
            }
            dispatch(&runtime, &dispatcher, repo_id, &root, &path, event.kind);
        }
    }
}

fn enqueue(
    pending: &mut HashMap<PathBuf, PendingEvent>,
    path: PathBuf,
    kind: &EventKind,
    seq: u64,
    queue_cap: usize,
) {
    let kind = match kind {
        EventKind::Remove(_) => PendingKind::Remove,
        // Renames surface as modify events on both endpoints; the missing
        // side is a removal.
        _ if !path.exists() => PendingKind::Remove,
        _ => PendingKind::Upsert,
    };

    // Last event wins within the window.
    pending.insert(
        path,
        PendingEvent {
            kind,
            at: Instant::now(),
            seq,
        },
    );

    // Backpressure: shed the oldest non-delete entries. Deletes must survive.
    if pending.len() > queue_cap {
        let mut evictable: Vec<(PathBuf, u64)> = pending
            .iter()
            .filter(|(_, e)| e.kind == PendingKind::Upsert)
            .map(|(p, e)| (p.clone(), e.seq))
            .collect();
        evictable.sort_by_key(|(_, s)| *s);
        let overflow = pending.len().saturating_sub(queue_cap);
        for (path, _) in evictable.into_iter().take(overflow) {
            warn!("Watcher queue overflow; shedding {:?}", path);
            pending.remove(&path);
        }
    }
}

fn dispatch(
    runtime: &tokio::runtime::Handle,
    dispatcher: &Arc<IndexDirectoryUseCase>,
    repo_id: i64,
    root: &Path,
    path: &Path,
    kind: PendingKind,
) {
    // Directory creation surfaces one event; enumerate the subtree.
    if kind == PendingKind::Upsert && path.is_dir() {
        for entry in walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            dispatch(runtime, dispatcher, repo_id, root, entry.path(), PendingKind::Upsert);
        }
        return;
    }

    debug!("Watcher dispatch {:?} ({:?})", path, kind);
    let result = runtime.block_on(dispatcher.reindex_file(repo_id, root, path));
    if let Err(e) = result {
        warn!("Re-index of {:?} failed: {}", path, e);
    }
}
