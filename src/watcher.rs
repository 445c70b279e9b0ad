use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::index::metadata::relative_path;
use crate::index::scanner::should_process_path;
use crate::index::IndexEvent;
use crate::settings::WatcherSettings;
use crate::{EventOutcome, Vault};

/// Window in which events are counted for burst detection
const BURST_WINDOW: Duration = Duration::from_secs(2);
/// Removals are re-checked after this delay; sync clients often delete and recreate
const REMOVAL_RECHECK: Duration = Duration::from_millis(100);

/// What the watcher thread reports back to its owner.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum VaultNotice {
    Indexed { event: IndexEvent, outcome: EventOutcome },
    Error { path: String, message: String },
    BurstStarted { file_count: usize },
    BurstEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstSignal {
    Started(usize),
    Ended,
}

/// Per-path debounce with burst detection. Time is passed in so the logic
/// can be driven without a real file system.
#[derive(Debug)]
pub struct EventCoalescer {
    debounce: Duration,
    burst_debounce: Duration,
    burst_threshold: usize,
    pending: HashMap<PathBuf, Instant>,
    burst_count: usize,
    burst_window_start: Instant,
    in_burst: bool,
}

impl EventCoalescer {
    pub fn new(settings: &WatcherSettings, now: Instant) -> Self {
        Self {
            debounce: Duration::from_millis(settings.debounce_ms),
            burst_debounce: Duration::from_millis(settings.burst_debounce_ms),
            burst_threshold: settings.burst_threshold,
            pending: HashMap::new(),
            burst_count: 0,
            burst_window_start: now,
            in_burst: false,
        }
    }

    /// How often the owner should call `take_stable` while idle.
    pub fn tick(&self) -> Duration {
        (self.debounce / 2).max(Duration::from_millis(10))
    }

    /// Count events towards burst detection. Returns `Started` once per burst.
    pub fn observe(&mut self, event_count: usize, now: Instant) -> Option<BurstSignal> {
        if now.duration_since(self.burst_window_start) > BURST_WINDOW {
            self.burst_count = 0;
            self.burst_window_start = now;
        }
        self.burst_count += event_count;
        if self.burst_count > self.burst_threshold && !self.in_burst {
            self.in_burst = true;
            return Some(BurstSignal::Started(self.burst_count));
        }
        None
    }

    /// Mark a path as changed, restarting its quiet period.
    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    pub fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_bursting(&self) -> bool {
        self.in_burst
    }

    /// Drain paths quiet for the effective debounce, sorted. Reports the end
    /// of a burst once nothing is left pending.
    pub fn take_stable(&mut self, now: Instant) -> (Vec<PathBuf>, Option<BurstSignal>) {
        let effective = if self.burst_count > self.burst_threshold {
            self.burst_debounce
        } else {
            self.debounce
        };

        let mut stable = Vec::new();
        self.pending.retain(|path, last_event| {
            if now.duration_since(*last_event) >= effective {
                stable.push(path.clone());
                false
            } else {
                true
            }
        });
        stable.sort();

        let mut signal = None;
        if self.in_burst && self.pending.is_empty() {
            self.in_burst = false;
            self.burst_count = 0;
            signal = Some(BurstSignal::Ended);
        }
        (stable, signal)
    }
}

pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
}

impl VaultWatcher {
    /// Watch the vault recursively and keep its indexes current. Every applied
    /// change is reported on `notices`; the watcher stops when dropped.
    pub fn start(vault: Vault, notices: Sender<VaultNotice>) -> Result<Self, String> {
        let root = vault.root().to_path_buf();
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            tx,
            Config::default().with_poll_interval(Duration::from_millis(300)),
        )
        .map_err(|e| format!("Failed to create watcher: {}", e))?;
        watcher
            .watch(root.as_path(), RecursiveMode::Recursive)
            .map_err(|e| format!("Failed to watch {:?}: {}", root, e))?;
        log::info!("[Watcher] Watching {:?}", root);

        thread::spawn(move || {
            let mut coalescer = EventCoalescer::new(&vault.settings().watcher, Instant::now());
            let tick = coalescer.tick();

            loop {
                match rx.recv_timeout(tick) {
                    Ok(Ok(event)) => {
                        handle_event(&vault, &root, &mut coalescer, event, &notices);
                    }
                    Ok(Err(e)) => {
                        log::warn!("[Watcher] File watcher error: {}", e);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let (stable, signal) = coalescer.take_stable(Instant::now());
                        if !stable.is_empty() {
                            log::debug!("[Watcher] Processing {} stable paths", stable.len());
                        }
                        for path in stable {
                            let rel = match relative_path(&root, &path) {
                                Ok(rel) => rel,
                                Err(e) => {
                                    log::warn!("[Watcher] {}", e);
                                    continue;
                                }
                            };
                            let event = if path.is_file() {
                                IndexEvent::modified(rel)
                            } else {
                                IndexEvent::deleted(rel)
                            };
                            apply(&vault, event, &notices);
                        }
                        if signal == Some(BurstSignal::Ended) {
                            log::info!("[Watcher] Burst settled");
                            let _ = notices.send(VaultNotice::BurstEnded);
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        log::info!("[Watcher] Stopped");
                        break;
                    }
                }
            }
        });

        Ok(VaultWatcher { _watcher: watcher })
    }
}

fn handle_event(
    vault: &Vault,
    root: &Path,
    coalescer: &mut EventCoalescer,
    event: Event,
    notices: &Sender<VaultNotice>,
) {
    let now = Instant::now();
    if let Some(BurstSignal::Started(count)) = coalescer.observe(event.paths.len(), now) {
        log::info!("[Watcher] Burst detected ({} events), using extended debounce", count);
        let _ = notices.send(VaultNotice::BurstStarted { file_count: count });
    }

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let (from, to) = (&event.paths[0], &event.paths[1]);
            coalescer.forget(from);
            coalescer.forget(to);
            if let Some(index_event) = rename_event(root, from, to) {
                apply(vault, index_event, notices);
            }
        }
        EventKind::Remove(_) => {
            // one wait for the whole batch
            thread::sleep(REMOVAL_RECHECK);
            for path in &event.paths {
                coalescer.forget(path);
                if should_process_path(path, root) && !path.exists() {
                    if let Ok(rel) = relative_path(root, path) {
                        apply(vault, IndexEvent::deleted(rel), notices);
                    }
                }
            }
        }
        EventKind::Access(_) => {}
        _ => {
            for path in &event.paths {
                if should_process_path(path, root) {
                    coalescer.touch(path.clone(), now);
                }
            }
        }
    }
}

/// Pair both halves of a rename; moves across the markdown boundary become
/// plain creates or deletes.
pub fn rename_event(root: &Path, from: &Path, to: &Path) -> Option<IndexEvent> {
    let from_ok = should_process_path(from, root);
    let to_ok = should_process_path(to, root);
    let from_rel = relative_path(root, from).ok();
    let to_rel = relative_path(root, to).ok();
    match (from_ok, to_ok, from_rel, to_rel) {
        (true, true, Some(from), Some(to)) => Some(IndexEvent::renamed(from, to)),
        (true, _, Some(from), _) => Some(IndexEvent::deleted(from)),
        (false, true, _, Some(to)) => Some(IndexEvent::created(to)),
        _ => None,
    }
}

fn apply(vault: &Vault, event: IndexEvent, notices: &Sender<VaultNotice>) {
    match vault.apply_event(&event) {
        Ok(outcome) => {
            if outcome.is_mutation() {
                log::debug!("[Watcher] {:?} -> {:?}", event, outcome);
            }
            let _ = notices.send(VaultNotice::Indexed { event, outcome });
        }
        Err(message) => {
            let path = event.target_path().unwrap_or_default().to_string();
            log::warn!("[Watcher] Failed to apply {:?}: {}", event, message);
            let _ = notices.send(VaultNotice::Error { path, message });
        }
    }
}
