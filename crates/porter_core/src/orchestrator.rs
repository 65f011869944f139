//! Transfer orchestrator
//!
//! Owns the active-process registry, runs paste and delete batches as
//! concurrent task fan-outs, aggregates byte progress, and publishes
//! process-lifecycle events to observers. There is no ambient global state:
//! every registry lives inside one orchestrator instance.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::namer::resolve_target_name;
use crate::process::{
    DeleteProcess, DeleteStatus, DeleteTarget, Process, ProcessId, ProcessSnapshot,
    TransferMode, TransferProcess, TransferStatus,
};
use crate::resolver::{resolve_deep, total_size};
use crate::tags::{TagId, TagStore};
use dashmap::DashMap;
use parking_lot::Mutex;
use porter_fs::{is_same_or_descendant, FileEntry, FileId, FsProvider, ProgressFn};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Lifecycle event pushed to observers. Every variant carries a full,
/// self-contained snapshot; a lagging observer loses history, not
/// consistency.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Created(ProcessSnapshot),
    Progress(ProcessSnapshot),
    Finished(ProcessSnapshot),
    Removed { id: ProcessId },
}

/// How a delete batch is authorized.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// `Some(use_trash)` skips the PendingUserInput state.
    pub pre_authorized: Option<bool>,
}

impl DeleteOptions {
    pub fn pre_authorized(use_trash: bool) -> Self {
        Self {
            pre_authorized: Some(use_trash),
        }
    }
}

struct Slot {
    process: Process,
    /// Periodic snapshot timer; at most one per process, aborted on every
    /// terminal transition.
    timer: Option<JoinHandle<()>>,
    done_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<ProcessId, Slot>,
    /// Insertion order of processes; `snapshots()` iterates in this order.
    order: Vec<ProcessId>,
}

struct Inner {
    provider: Arc<dyn FsProvider>,
    tags: Arc<dyn TagStore>,
    config: EngineConfig,
    registry: Mutex<Registry>,
    events: broadcast::Sender<ProcessEvent>,
}

/// Top-level coordinator for paste and delete processes.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// Shared counters of one transfer, handed to the per-source tasks.
#[derive(Clone)]
struct TransferShared {
    total: Arc<AtomicU64>,
    processed: Arc<AtomicU64>,
    per_source: Arc<DashMap<FileId, u64>>,
    cancel: Arc<AtomicBool>,
    /// Set by the first transfer failure; unstarted sources observe it and
    /// skip (fail-fast, cooperative).
    abort: Arc<AtomicBool>,
}

enum SourceOutcome {
    Completed,
    Skipped,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn FsProvider>,
        tags: Arc<dyn TagStore>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.events.buffer_size.max(16));
        Self {
            inner: Arc::new(Inner {
                provider,
                tags,
                config,
                registry: Mutex::new(Registry::default()),
                events,
            }),
        }
    }

    /// Subscribe to process-lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot one process.
    pub fn snapshot(&self, id: &ProcessId) -> Option<ProcessSnapshot> {
        let registry = self.inner.registry.lock();
        registry.slots.get(id).map(|slot| slot.process.snapshot())
    }

    /// Snapshot every registered process, in insertion order.
    pub fn snapshots(&self) -> Vec<ProcessSnapshot> {
        let registry = self.inner.registry.lock();
        registry
            .order
            .iter()
            .filter_map(|id| registry.slots.get(id))
            .map(|slot| slot.process.snapshot())
            .collect()
    }

    /// Start a paste batch: copy or move `sources` into `destination`.
    ///
    /// Validation runs before any I/O: the destination must not equal a
    /// source nor live inside one. The destination listing is captured once
    /// here and never re-read mid-batch; moves may overwrite (cut-paste is
    /// one-shot), copies never silently do.
    pub async fn paste_files(
        &self,
        sources: Vec<PathBuf>,
        destination: PathBuf,
        mode: TransferMode,
    ) -> Result<ProcessId> {
        for source in &sources {
            if is_same_or_descendant(source, &destination) {
                return Err(EngineError::InvalidDestination(format!(
                    "{} is inside {}",
                    destination.display(),
                    source.display()
                )));
            }
        }

        let (dest_entry, children) = self
            .inner
            .provider
            .resolve_with_children(&destination)
            .await
            .map_err(|e| EngineError::InvalidDestination(e.to_string()))?;
        if !dest_entry.is_directory() {
            return Err(EngineError::InvalidDestination(format!(
                "Not a directory: {}",
                destination.display()
            )));
        }
        let existing: Arc<HashSet<String>> =
            Arc::new(children.into_iter().map(|c| c.name).collect());

        let process = TransferProcess::new(mode, sources.clone(), dest_entry.path.clone());
        let id = process.id.clone();
        let shared = TransferShared {
            total: process.total_bytes.clone(),
            processed: process.processed_bytes.clone(),
            per_source: process.per_source.clone(),
            cancel: process.cancel_requested.clone(),
            abort: Arc::new(AtomicBool::new(false)),
        };

        self.register(Process::Paste(process));
        self.spawn_timer(&id);

        let this = self.clone();
        let dest_dir = dest_entry.path;
        let task_id = id.clone();
        tokio::spawn(async move {
            this.run_paste(task_id, sources, dest_dir, existing, mode, shared)
                .await;
        });

        Ok(id)
    }

    /// Schedule a delete batch. Without pre-authorization the process sits
    /// in PendingUserInput until [`confirm_delete`](Self::confirm_delete).
    pub fn schedule_delete(&self, targets: Vec<PathBuf>, options: DeleteOptions) -> ProcessId {
        let process = DeleteProcess::new(targets);
        let id = process.id.clone();
        self.register(Process::Delete(process));

        if let Some(use_trash) = options.pre_authorized {
            // Just created, guaranteed pending; the confirm cannot fail.
            let _ = self.confirm_delete(&id, use_trash);
        }
        id
    }

    /// Confirm a pending delete: trash vs. permanent is decided here, by
    /// the caller. Fails with InvalidState unless the process is pending.
    pub fn confirm_delete(&self, id: &ProcessId, use_trash: bool) -> Result<()> {
        let targets = {
            let mut registry = self.inner.registry.lock();
            let slot = registry
                .slots
                .get_mut(id)
                .ok_or_else(|| EngineError::InvalidState(format!("unknown process {}", id)))?;
            match &mut slot.process {
                Process::Delete(p) if p.status == DeleteStatus::PendingUserInput => {
                    p.status = DeleteStatus::Running;
                    p.use_trash = Some(use_trash);
                    p.targets.clone()
                }
                Process::Delete(_) => {
                    return Err(EngineError::InvalidState(format!(
                        "delete process {} is not awaiting confirmation",
                        id
                    )))
                }
                Process::Paste(_) => {
                    return Err(EngineError::InvalidState(format!(
                        "process {} is not a delete process",
                        id
                    )))
                }
            }
        };

        self.spawn_timer(id);
        let this = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            this.run_delete(id, targets, use_trash).await;
        });
        Ok(())
    }

    /// Request cooperative cancellation of a running transfer. In-flight
    /// copy/move calls finish; sources not yet started are skipped and the
    /// process terminates in Failure with a cancellation error.
    pub fn cancel_process(&self, id: &ProcessId) -> Result<()> {
        let registry = self.inner.registry.lock();
        let slot = registry
            .slots
            .get(id)
            .ok_or_else(|| EngineError::InvalidState(format!("unknown process {}", id)))?;
        match &slot.process {
            Process::Paste(p) if p.status == TransferStatus::Running => {
                p.cancel_requested.store(true, Ordering::Release);
                tracing::info!("Cancellation requested for process {}", id);
                Ok(())
            }
            Process::Paste(_) => Err(EngineError::InvalidState(format!(
                "process {} is not running",
                id
            ))),
            Process::Delete(_) => Err(EngineError::InvalidState(format!(
                "delete process {} cannot be cancelled",
                id
            ))),
        }
    }

    /// Remove a settled (or still pending) process from the registry.
    /// Removing a Running process fails with InvalidState and leaves it
    /// untouched.
    pub fn remove_process(&self, id: &ProcessId) -> Result<()> {
        let slot = {
            let mut registry = self.inner.registry.lock();
            match registry.slots.get(id) {
                None => {
                    return Err(EngineError::InvalidState(format!("unknown process {}", id)))
                }
                Some(slot) if !slot.process.is_removable() => {
                    return Err(EngineError::InvalidState(format!(
                        "cannot remove running process {}",
                        id
                    )))
                }
                Some(_) => {}
            }
            registry.order.retain(|o| o != id);
            match registry.slots.remove(id) {
                Some(slot) => slot,
                None => return Err(EngineError::InvalidState(format!("unknown process {}", id))),
            }
        };

        if let Some(timer) = slot.timer {
            timer.abort();
        }
        let _ = self
            .inner
            .events
            .send(ProcessEvent::Removed { id: id.clone() });
        Ok(())
    }

    /// Wait for a process to reach a terminal state and return its final
    /// snapshot. A pending delete waits until it is confirmed and settles.
    pub async fn wait(&self, id: &ProcessId) -> Result<ProcessSnapshot> {
        let mut done_rx = {
            let registry = self.inner.registry.lock();
            let slot = registry
                .slots
                .get(id)
                .ok_or_else(|| EngineError::InvalidState(format!("unknown process {}", id)))?;
            let snapshot = slot.process.snapshot();
            if snapshot.is_terminal() {
                return Ok(snapshot);
            }
            slot.done_tx.subscribe()
        };

        while !*done_rx.borrow() {
            done_rx.changed().await.map_err(|_| {
                EngineError::InvalidState(format!("process {} removed while waiting", id))
            })?;
        }

        self.snapshot(id)
            .ok_or_else(|| EngineError::InvalidState(format!("process {} disappeared", id)))
    }

    // ===== internals =====

    fn register(&self, process: Process) {
        let id = process.id().clone();
        let snapshot = process.snapshot();
        {
            let mut registry = self.inner.registry.lock();
            let (done_tx, _) = watch::channel(false);
            registry.slots.insert(
                id.clone(),
                Slot {
                    process,
                    timer: None,
                    done_tx,
                },
            );
            registry.order.push(id);
        }
        let _ = self.inner.events.send(ProcessEvent::Created(snapshot));
    }

    /// Spawn the periodic snapshot timer for a running process. The handle
    /// is stored in the slot and aborted on the terminal transition, so no
    /// timer outlives its process.
    fn spawn_timer(&self, id: &ProcessId) {
        let interval_ms = self.inner.config.transfer.snapshot_interval_ms.max(10);
        let this = self.clone();
        let timer_id = id.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // the immediate first tick; Created already carried a snapshot
            loop {
                ticker.tick().await;
                let Some(snapshot) = this.snapshot(&timer_id) else {
                    break;
                };
                if snapshot.is_terminal() {
                    break;
                }
                let _ = this.inner.events.send(ProcessEvent::Progress(snapshot));
            }
        });

        let mut registry = self.inner.registry.lock();
        if let Some(slot) = registry.slots.get_mut(id) {
            debug_assert!(slot.timer.is_none(), "one timer per process");
            slot.timer = Some(handle);
        } else {
            handle.abort();
        }
    }

    async fn run_paste(
        &self,
        id: ProcessId,
        sources: Vec<PathBuf>,
        dest_dir: PathBuf,
        existing: Arc<HashSet<String>>,
        mode: TransferMode,
        shared: TransferShared,
    ) {
        let limit = self.inner.config.transfer.max_concurrent_sources;
        let semaphore = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));

        let mut set = JoinSet::new();
        for source in sources {
            let this = self.clone();
            let dest_dir = dest_dir.clone();
            let existing = existing.clone();
            let shared = shared.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = match semaphore {
                    Some(sem) => Some(
                        sem.acquire_owned()
                            .await
                            .map_err(|_| EngineError::Cancelled)?,
                    ),
                    None => None,
                };
                this.run_source(source, dest_dir, existing, mode, shared).await
            });
        }

        let mut first_error: Option<String> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(SourceOutcome::Completed)) | Ok(Ok(SourceOutcome::Skipped)) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e.user_message());
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(format!("transfer task failed: {}", e));
                    }
                }
            }
        }

        let cancelled = shared.cancel.load(Ordering::Acquire);
        let (status, error) = match first_error {
            Some(msg) => (TransferStatus::Failure, Some(msg)),
            None if cancelled => (
                TransferStatus::Failure,
                Some(EngineError::Cancelled.user_message()),
            ),
            None => (TransferStatus::Success, None),
        };
        self.finish_transfer(&id, status, error);
    }

    /// One source of a paste batch: resolve, name, transfer, tag.
    async fn run_source(
        &self,
        source: PathBuf,
        dest_dir: PathBuf,
        existing: Arc<HashSet<String>>,
        mode: TransferMode,
        shared: TransferShared,
    ) -> Result<SourceOutcome> {
        if shared.cancel.load(Ordering::Acquire) || shared.abort.load(Ordering::Acquire) {
            return Ok(SourceOutcome::Skipped);
        }

        // Resolution failures skip this source; the batch continues.
        let entry = match self.inner.provider.resolve(&source).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping source {}: {}", source.display(), e);
                return Ok(SourceOutcome::Skipped);
            }
        };
        let tree = match resolve_deep(self.inner.provider.clone(), entry.clone()).await {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!("Skipping source {}: {}", source.display(), e);
                return Ok(SourceOutcome::Skipped);
            }
        };

        let source_total = total_size(&tree);
        shared.total.fetch_add(source_total, Ordering::AcqRel);
        shared.per_source.insert(entry.id.clone(), 0);

        let allow_overwrite = mode == TransferMode::Move;
        let name = resolve_target_name(&existing, &entry.name, entry.is_directory(), allow_overwrite);
        let target = dest_dir.join(&name);

        // Last cooperative checkpoint before touching the file system.
        if shared.cancel.load(Ordering::Acquire) || shared.abort.load(Ordering::Acquire) {
            return Ok(SourceOutcome::Skipped);
        }

        let progress: ProgressFn = {
            let per_source = shared.per_source.clone();
            let processed = shared.processed.clone();
            let source_id = entry.id.clone();
            Arc::new(move |n| {
                *per_source.entry(source_id.clone()).or_insert(0) += n;
                processed.fetch_add(n, Ordering::AcqRel);
            })
        };

        let result = match mode {
            TransferMode::Copy => {
                self.inner
                    .provider
                    .copy(&entry.path, &target, allow_overwrite, progress)
                    .await
            }
            TransferMode::Move => {
                self.inner
                    .provider
                    .move_entry(&entry.path, &target, allow_overwrite, progress)
                    .await
            }
        };

        if let Err(e) = result {
            shared.abort.store(true, Ordering::Release);
            tracing::error!(
                "Transfer failed for {} -> {}: {}",
                entry.path.display(),
                target.display(),
                e
            );
            return Err(EngineError::TransferIo(e.to_string()));
        }

        // A same-device rename reports no byte progress: top the counters up
        // to this source's resolved size.
        let reported = shared
            .per_source
            .get(&entry.id)
            .map(|v| *v)
            .unwrap_or_default();
        if reported < source_total {
            let missing = source_total - reported;
            shared.per_source.insert(entry.id.clone(), source_total);
            shared.processed.fetch_add(missing, Ordering::AcqRel);
        }

        self.propagate_tags(&tree, &entry, &target, mode);
        tracing::info!(
            "{:?}: {} -> {}",
            mode,
            entry.path.display(),
            target.display()
        );
        Ok(SourceOutcome::Completed)
    }

    /// Mirror each leaf's tags to its new location. Copy keeps the source
    /// tags; move clears them.
    fn propagate_tags(
        &self,
        tree: &crate::resolver::FileTreeMap,
        root: &FileEntry,
        target_root: &std::path::Path,
        mode: TransferMode,
    ) {
        for leaf in tree.values() {
            let tags: Vec<TagId> = self.inner.tags.tags_of(&leaf.id);
            if tags.is_empty() {
                continue;
            }

            let target_leaf = match leaf.path.strip_prefix(&root.path) {
                Ok(rel) if rel.as_os_str().is_empty() => target_root.to_path_buf(),
                Ok(rel) => target_root.join(rel),
                Err(_) => {
                    tracing::warn!(
                        "Leaf {} escaped its source root, tags not propagated",
                        leaf.path.display()
                    );
                    continue;
                }
            };

            let target_id = FileId::from_path(&target_leaf);
            self.inner.tags.add_tags(&[target_id], &tags);
            if mode == TransferMode::Move {
                self.inner.tags.remove_tags(std::slice::from_ref(&leaf.id), &tags);
            }
        }
    }

    async fn run_delete(&self, id: ProcessId, targets: Vec<DeleteTarget>, use_trash: bool) {
        let total = targets.len();
        let mut set = JoinSet::new();
        for target in targets {
            let provider = self.inner.provider.clone();
            set.spawn(async move {
                let result = provider.delete(&target.path, use_trash, true).await;
                (target.name, result)
            });
        }

        // Best-effort: a failed target never aborts its siblings.
        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => {
                    tracing::warn!("Failed to delete {}: {}", name, e);
                    failures.push(format!("{}: {}", name, e));
                }
                Err(e) => failures.push(format!("delete task failed: {}", e)),
            }
        }

        let (status, error) = if failures.is_empty() {
            (DeleteStatus::Success, None)
        } else {
            (
                DeleteStatus::Failure,
                Some(format!(
                    "Failed to delete {} of {} targets: {}",
                    failures.len(),
                    total,
                    failures.join("; ")
                )),
            )
        };
        self.finish_delete(&id, status, error);
    }

    fn finish_transfer(&self, id: &ProcessId, status: TransferStatus, error: Option<String>) {
        self.finish_with(id, |process| match process {
            Process::Paste(p) => {
                p.status = status;
                p.error = error.clone();
                true
            }
            Process::Delete(_) => false,
        });
    }

    fn finish_delete(&self, id: &ProcessId, status: DeleteStatus, error: Option<String>) {
        self.finish_with(id, |process| match process {
            Process::Delete(p) => {
                p.status = status;
                p.error = error.clone();
                true
            }
            Process::Paste(_) => false,
        });
    }

    /// Apply a terminal transition: update the record, abort the snapshot
    /// timer, emit the final snapshot synchronously, release waiters.
    fn finish_with<F: FnMut(&mut Process) -> bool>(&self, id: &ProcessId, mut apply: F) {
        let (snapshot, timer) = {
            let mut registry = self.inner.registry.lock();
            let Some(slot) = registry.slots.get_mut(id) else {
                tracing::warn!("Terminal transition for unknown process {}", id);
                return;
            };
            if !apply(&mut slot.process) {
                tracing::error!("Terminal transition applied to wrong process kind: {}", id);
                return;
            }
            (slot.process.snapshot(), slot.timer.take())
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        // Publish before releasing waiters, so anyone woken by `wait` finds
        // the Finished event already in the channel.
        let _ = self.inner.events.send(ProcessEvent::Finished(snapshot));
        let registry = self.inner.registry.lock();
        if let Some(slot) = registry.slots.get(id) {
            let _ = slot.done_tx.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::MemoryTagStore;
    use async_trait::async_trait;
    use porter_fs::{FsError, LocalFs};
    use std::fs;
    use std::path::Path;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "porter_orch_{}_{}_{}",
            tag,
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(snapshot_interval_ms: u64, max_concurrent_sources: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.transfer.snapshot_interval_ms = snapshot_interval_ms;
        config.transfer.max_concurrent_sources = max_concurrent_sources;
        config
    }

    fn orchestrator_with(
        provider: Arc<dyn FsProvider>,
        config: EngineConfig,
    ) -> (Orchestrator, Arc<MemoryTagStore>) {
        let tags = Arc::new(MemoryTagStore::new());
        let orchestrator = Orchestrator::new(provider, tags.clone(), config);
        (orchestrator, tags)
    }

    fn local_orchestrator() -> (Orchestrator, Arc<MemoryTagStore>) {
        orchestrator_with(Arc::new(LocalFs::new()), test_config(5_000, 0))
    }

    /// Provider that stalls every transferred chunk; gives tests a window
    /// to observe Running processes and issue cancellations.
    struct SlowFs {
        inner: LocalFs,
        start_delay: Duration,
        chunk_delay: Duration,
    }

    impl SlowFs {
        fn new(start_delay: Duration, chunk_delay: Duration) -> Self {
            Self {
                inner: LocalFs::with_chunk_size(4096),
                start_delay,
                chunk_delay,
            }
        }

        fn slow_progress(&self, progress: ProgressFn) -> ProgressFn {
            let delay = self.chunk_delay;
            Arc::new(move |n| {
                std::thread::sleep(delay);
                progress(n);
            })
        }
    }

    #[async_trait]
    impl FsProvider for SlowFs {
        async fn resolve(&self, path: &Path) -> porter_fs::Result<FileEntry> {
            self.inner.resolve(path).await
        }

        async fn resolve_with_children(
            &self,
            path: &Path,
        ) -> porter_fs::Result<(FileEntry, Vec<FileEntry>)> {
            self.inner.resolve_with_children(path).await
        }

        async fn copy(
            &self,
            src: &Path,
            dst: &Path,
            overwrite: bool,
            progress: ProgressFn,
        ) -> porter_fs::Result<()> {
            tokio::time::sleep(self.start_delay).await;
            self.inner
                .copy(src, dst, overwrite, self.slow_progress(progress))
                .await
        }

        async fn move_entry(
            &self,
            src: &Path,
            dst: &Path,
            overwrite: bool,
            progress: ProgressFn,
        ) -> porter_fs::Result<()> {
            tokio::time::sleep(self.start_delay).await;
            self.inner
                .move_entry(src, dst, overwrite, self.slow_progress(progress))
                .await
        }

        async fn delete(
            &self,
            path: &Path,
            use_trash: bool,
            recursive: bool,
        ) -> porter_fs::Result<()> {
            self.inner.delete(path, use_trash, recursive).await
        }

        async fn create_folder(&self, path: &Path) -> porter_fs::Result<FileEntry> {
            self.inner.create_folder(path).await
        }
    }

    /// Provider that fails any transfer whose source path contains "poison".
    struct FailFs {
        inner: LocalFs,
    }

    #[async_trait]
    impl FsProvider for FailFs {
        async fn resolve(&self, path: &Path) -> porter_fs::Result<FileEntry> {
            self.inner.resolve(path).await
        }

        async fn resolve_with_children(
            &self,
            path: &Path,
        ) -> porter_fs::Result<(FileEntry, Vec<FileEntry>)> {
            self.inner.resolve_with_children(path).await
        }

        async fn copy(
            &self,
            src: &Path,
            dst: &Path,
            overwrite: bool,
            progress: ProgressFn,
        ) -> porter_fs::Result<()> {
            if src.to_string_lossy().contains("poison") {
                return Err(FsError::InvalidPath("injected copy failure".to_string()));
            }
            self.inner.copy(src, dst, overwrite, progress).await
        }

        async fn move_entry(
            &self,
            src: &Path,
            dst: &Path,
            overwrite: bool,
            progress: ProgressFn,
        ) -> porter_fs::Result<()> {
            if src.to_string_lossy().contains("poison") {
                return Err(FsError::InvalidPath("injected move failure".to_string()));
            }
            self.inner.move_entry(src, dst, overwrite, progress).await
        }

        async fn delete(
            &self,
            path: &Path,
            use_trash: bool,
            recursive: bool,
        ) -> porter_fs::Result<()> {
            self.inner.delete(path, use_trash, recursive).await
        }

        async fn create_folder(&self, path: &Path) -> porter_fs::Result<FileEntry> {
            self.inner.create_folder(path).await
        }
    }

    fn expect_paste(snapshot: &ProcessSnapshot) -> &crate::process::TransferSnapshot {
        match snapshot {
            ProcessSnapshot::Paste(s) => s,
            ProcessSnapshot::Delete(_) => panic!("expected a paste snapshot"),
        }
    }

    fn expect_delete(snapshot: &ProcessSnapshot) -> &crate::process::DeleteSnapshot {
        match snapshot {
            ProcessSnapshot::Delete(s) => s,
            ProcessSnapshot::Paste(_) => panic!("expected a delete snapshot"),
        }
    }

    #[tokio::test]
    async fn single_file_paste_reports_full_progress() {
        let dir = scratch_dir("single");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        let file = src_dir.join("payload.bin");
        fs::write(&file, vec![1u8; 100]).unwrap();

        let (orchestrator, _) = local_orchestrator();
        let mut events = orchestrator.subscribe();

        let id = orchestrator
            .paste_files(vec![file.clone()], dst_dir.clone(), TransferMode::Copy)
            .await
            .unwrap();
        let snapshot = orchestrator.wait(&id).await.unwrap();

        let paste = expect_paste(&snapshot);
        assert_eq!(paste.status, TransferStatus::Success);
        assert_eq!(paste.total_bytes, 100);
        assert_eq!(paste.processed_bytes, 100);
        assert!(paste.error.is_none());
        assert!(dst_dir.join("payload.bin").exists());
        assert!(file.exists(), "copy must not consume the source");

        // Exactly one terminal transition was published.
        let mut finished = 0;
        while let Ok(event) = events.try_recv() {
            if let ProcessEvent::Finished(snap) = event {
                finished += 1;
                let s = expect_paste(&snap);
                assert_eq!(s.processed_bytes, 100);
                assert_eq!(s.total_bytes, 100);
            }
        }
        assert_eq!(finished, 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn copy_resolves_name_collision() {
        let dir = scratch_dir("collide");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        fs::write(src_dir.join("report.txt"), b"fresh").unwrap();
        fs::write(dst_dir.join("report.txt"), b"old").unwrap();

        let (orchestrator, _) = local_orchestrator();
        let id = orchestrator
            .paste_files(
                vec![src_dir.join("report.txt")],
                dst_dir.clone(),
                TransferMode::Copy,
            )
            .await
            .unwrap();
        let snapshot = orchestrator.wait(&id).await.unwrap();

        assert_eq!(expect_paste(&snapshot).status, TransferStatus::Success);
        assert_eq!(fs::read(dst_dir.join("report.txt")).unwrap(), b"old");
        assert_eq!(fs::read(dst_dir.join("report copy.txt")).unwrap(), b"fresh");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn move_may_overwrite_and_consumes_source() {
        let dir = scratch_dir("move");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        let src = src_dir.join("notes.txt");
        fs::write(&src, b"new contents").unwrap();
        fs::write(dst_dir.join("notes.txt"), b"stale").unwrap();

        let (orchestrator, _) = local_orchestrator();
        let id = orchestrator
            .paste_files(vec![src.clone()], dst_dir.clone(), TransferMode::Move)
            .await
            .unwrap();
        let snapshot = orchestrator.wait(&id).await.unwrap();

        let paste = expect_paste(&snapshot);
        assert_eq!(paste.status, TransferStatus::Success);
        assert_eq!(paste.processed_bytes, paste.total_bytes);
        assert!(!src.exists());
        assert_eq!(fs::read(dst_dir.join("notes.txt")).unwrap(), b"new contents");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn paste_into_own_subdirectory_rejected() {
        let dir = scratch_dir("selfdest");
        let source = dir.join("tree");
        let inner = source.join("sub");
        fs::create_dir_all(&inner).unwrap();

        let (orchestrator, _) = local_orchestrator();
        let err = orchestrator
            .paste_files(vec![source], inner, TransferMode::Copy)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidDestination(_)));
        assert!(orchestrator.snapshots().is_empty(), "no process was created");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn paste_onto_itself_rejected() {
        let dir = scratch_dir("selfsame");
        let (orchestrator, _) = local_orchestrator();
        let err = orchestrator
            .paste_files(vec![dir.clone()], dir.clone(), TransferMode::Copy)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDestination(_)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn vanished_source_is_skipped_not_fatal() {
        let dir = scratch_dir("vanish");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        let real = src_dir.join("kept.bin");
        fs::write(&real, vec![3u8; 50]).unwrap();
        let ghost = src_dir.join("ghost.bin");

        let (orchestrator, _) = local_orchestrator();
        let id = orchestrator
            .paste_files(vec![ghost, real], dst_dir.clone(), TransferMode::Copy)
            .await
            .unwrap();
        let snapshot = orchestrator.wait(&id).await.unwrap();

        let paste = expect_paste(&snapshot);
        assert_eq!(paste.status, TransferStatus::Success);
        assert_eq!(paste.total_bytes, 50, "skipped source contributes nothing");
        assert_eq!(paste.processed_bytes, 50);
        assert!(dst_dir.join("kept.bin").exists());
        assert!(!dst_dir.join("ghost.bin").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn transfer_failure_is_fatal_for_the_process() {
        let dir = scratch_dir("failfast");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        let poison = src_dir.join("poison.bin");
        fs::write(&poison, vec![4u8; 10]).unwrap();

        let (orchestrator, _) = orchestrator_with(
            Arc::new(FailFs {
                inner: LocalFs::new(),
            }),
            test_config(5_000, 0),
        );
        let id = orchestrator
            .paste_files(vec![poison], dst_dir, TransferMode::Copy)
            .await
            .unwrap();
        let snapshot = orchestrator.wait(&id).await.unwrap();

        let paste = expect_paste(&snapshot);
        assert_eq!(paste.status, TransferStatus::Failure);
        assert!(paste.error.as_deref().unwrap().contains("injected"));
        assert_eq!(paste.source_names, vec!["poison.bin".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn cancel_skips_unstarted_sources_and_keeps_finished_work() {
        let dir = scratch_dir("cancel");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        fs::write(src_dir.join("first.bin"), vec![1u8; 40_960]).unwrap();
        fs::write(src_dir.join("second.bin"), vec![2u8; 40_960]).unwrap();

        // One source at a time, each copy in flight for ~300ms (ten 4 KiB
        // chunks at 30ms each), so a cancel at 100ms lands while the first
        // copy is running and before the second claims the semaphore.
        let provider = Arc::new(SlowFs::new(Duration::ZERO, Duration::from_millis(30)));
        let (orchestrator, _) = orchestrator_with(provider, test_config(5_000, 1));

        let id = orchestrator
            .paste_files(
                vec![src_dir.join("first.bin"), src_dir.join("second.bin")],
                dst_dir.clone(),
                TransferMode::Copy,
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.cancel_process(&id).unwrap();
        let snapshot = orchestrator.wait(&id).await.unwrap();

        let paste = expect_paste(&snapshot);
        assert_eq!(paste.status, TransferStatus::Failure);
        assert!(paste.cancellation_requested);
        assert!(paste.error.as_deref().unwrap().to_lowercase().contains("cancel"));

        // The in-flight source ran to completion, the unstarted one never
        // touched the destination.
        let copied = fs::read_dir(&dst_dir).unwrap().count();
        assert_eq!(copied, 1, "exactly one source settled before the cancel");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn remove_running_process_is_rejected() {
        let dir = scratch_dir("remove");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        fs::write(src_dir.join("slow.bin"), vec![5u8; 4096]).unwrap();

        let provider = Arc::new(SlowFs::new(
            Duration::from_millis(300),
            Duration::from_millis(1),
        ));
        let (orchestrator, _) = orchestrator_with(provider, test_config(5_000, 0));

        let id = orchestrator
            .paste_files(
                vec![src_dir.join("slow.bin")],
                dst_dir,
                TransferMode::Copy,
            )
            .await
            .unwrap();

        let err = orchestrator.remove_process(&id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        // The process is untouched and still settles normally.
        let snapshot = orchestrator.wait(&id).await.unwrap();
        assert_eq!(expect_paste(&snapshot).status, TransferStatus::Success);

        orchestrator.remove_process(&id).unwrap();
        assert!(orchestrator.snapshot(&id).is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn tags_follow_copy_and_move() {
        let dir = scratch_dir("tags");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(src_dir.join("bundle")).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        let copied = src_dir.join("copied.txt");
        let nested = src_dir.join("bundle").join("nested.txt");
        fs::write(&copied, b"c").unwrap();
        fs::write(&nested, b"n").unwrap();

        let (orchestrator, tags) = local_orchestrator();
        let copied_id = FileId::from_path(&copied);
        let nested_id = FileId::from_path(&nested);
        tags.add_tags(&[copied_id.clone()], &["red".to_string()]);
        tags.add_tags(&[nested_id.clone()], &["blue".to_string()]);

        // Copy keeps the source tags.
        let id = orchestrator
            .paste_files(vec![copied.clone()], dst_dir.clone(), TransferMode::Copy)
            .await
            .unwrap();
        orchestrator.wait(&id).await.unwrap();
        assert_eq!(tags.tags_of(&copied_id), vec!["red".to_string()]);
        assert_eq!(
            tags.tags_of(&FileId::from_path(dst_dir.join("copied.txt"))),
            vec!["red".to_string()]
        );

        // Move clears them, including leaves of a moved directory.
        let id = orchestrator
            .paste_files(
                vec![src_dir.join("bundle")],
                dst_dir.clone(),
                TransferMode::Move,
            )
            .await
            .unwrap();
        orchestrator.wait(&id).await.unwrap();
        assert!(tags.tags_of(&nested_id).is_empty());
        assert_eq!(
            tags.tags_of(&FileId::from_path(
                dst_dir.join("bundle").join("nested.txt")
            )),
            vec!["blue".to_string()]
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn pending_delete_can_be_discarded_or_confirmed() {
        let dir = scratch_dir("pending");
        let doomed = dir.join("doomed.txt");
        fs::write(&doomed, b"bye").unwrap();

        let (orchestrator, _) = local_orchestrator();

        // Discard straight from PendingUserInput.
        let id = orchestrator.schedule_delete(vec![doomed.clone()], DeleteOptions::default());
        assert_eq!(
            expect_delete(&orchestrator.snapshot(&id).unwrap()).status,
            DeleteStatus::PendingUserInput
        );
        orchestrator.remove_process(&id).unwrap();
        assert!(doomed.exists(), "discarded delete must not touch disk");

        // Confirm and run.
        let id = orchestrator.schedule_delete(vec![doomed.clone()], DeleteOptions::default());
        orchestrator.confirm_delete(&id, false).unwrap();
        let snapshot = orchestrator.wait(&id).await.unwrap();
        assert_eq!(expect_delete(&snapshot).status, DeleteStatus::Success);
        assert!(!doomed.exists());

        // A second confirmation is an invalid transition.
        let err = orchestrator.confirm_delete(&id, false).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn pre_authorized_delete_skips_confirmation() {
        let dir = scratch_dir("preauth");
        let doomed = dir.join("doomed.txt");
        fs::write(&doomed, b"bye").unwrap();

        let (orchestrator, _) = local_orchestrator();
        let id =
            orchestrator.schedule_delete(vec![doomed.clone()], DeleteOptions::pre_authorized(false));
        let snapshot = orchestrator.wait(&id).await.unwrap();

        assert_eq!(expect_delete(&snapshot).status, DeleteStatus::Success);
        assert!(!doomed.exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn delete_is_best_effort_and_aggregates_failures() {
        let dir = scratch_dir("besteffort");
        let real = dir.join("real.txt");
        fs::write(&real, b"x").unwrap();
        let ghost = dir.join("ghost.txt");

        let (orchestrator, _) = local_orchestrator();
        let id = orchestrator.schedule_delete(
            vec![real.clone(), ghost.clone()],
            DeleteOptions::pre_authorized(false),
        );
        let snapshot = orchestrator.wait(&id).await.unwrap();

        let delete = expect_delete(&snapshot);
        assert_eq!(delete.status, DeleteStatus::Failure);
        assert!(!real.exists(), "siblings of a failed target still ran");
        let message = delete.error.as_deref().unwrap();
        assert!(message.contains("ghost.txt"));
        assert!(message.contains("1 of 2"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn snapshots_list_in_insertion_order() {
        let dir = scratch_dir("order");
        let (orchestrator, _) = local_orchestrator();

        let first = orchestrator.schedule_delete(vec![dir.join("a")], DeleteOptions::default());
        let second = orchestrator.schedule_delete(vec![dir.join("b")], DeleteOptions::default());

        let snapshots = orchestrator.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].id(), &first);
        assert_eq!(snapshots[1].id(), &second);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn periodic_snapshots_are_monotonic_and_bounded() {
        let dir = scratch_dir("monotonic");
        let src_dir = dir.join("src");
        let dst_dir = dir.join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        fs::write(src_dir.join("big.bin"), vec![6u8; 120_000]).unwrap();

        // ~30 chunks x 5ms against a 20ms snapshot cadence.
        let provider = Arc::new(SlowFs::new(Duration::ZERO, Duration::from_millis(5)));
        let (orchestrator, _) = orchestrator_with(provider, test_config(20, 0));
        let mut events = orchestrator.subscribe();

        let id = orchestrator
            .paste_files(vec![src_dir.join("big.bin")], dst_dir, TransferMode::Copy)
            .await
            .unwrap();

        let mut last = 0u64;
        loop {
            match events.recv().await.unwrap() {
                ProcessEvent::Progress(snap) => {
                    let paste = expect_paste(&snap);
                    assert!(paste.processed_bytes >= last, "progress went backwards");
                    assert!(paste.processed_bytes <= paste.total_bytes);
                    last = paste.processed_bytes;
                }
                ProcessEvent::Finished(snap) => {
                    let paste = expect_paste(&snap);
                    assert_eq!(paste.status, TransferStatus::Success);
                    assert_eq!(paste.processed_bytes, paste.total_bytes);
                    assert_eq!(paste.total_bytes, 120_000);
                    break;
                }
                _ => {}
            }
        }
        let _ = orchestrator.wait(&id).await.unwrap();

        let _ = fs::remove_dir_all(&dir);
    }
}
