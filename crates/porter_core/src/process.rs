//! Process records and snapshots
//!
//! A process is a tracked, observable long-running operation (paste or
//! delete). The orchestrator owns and mutates the records; observers only
//! ever see immutable snapshots.

use dashmap::DashMap;
use porter_fs::FileId;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Unique process identifier; generated fresh per process, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Copy vs. move (cut-paste)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferMode {
    Copy,
    Move,
}

/// Transfer process status. Transfers start Running; paste needs no
/// confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferStatus {
    Running,
    Success,
    Failure,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::Running)
    }
}

/// Delete process status; Running is entered only after explicit
/// confirmation (or pre-authorization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeleteStatus {
    PendingUserInput,
    Running,
    Success,
    Failure,
}

impl DeleteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeleteStatus::Success | DeleteStatus::Failure)
    }
}

/// One source item of a transfer, captured at process creation so Failure
/// snapshots can still show names after the live file system moved on.
#[derive(Debug, Clone)]
pub struct TransferSource {
    pub path: PathBuf,
    pub name: String,
}

impl TransferSource {
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self { path, name }
    }
}

/// State of one paste (copy/move) batch.
///
/// The atomic counters and the per-source map are shared with the runner
/// tasks; `status` and `error` are written only by the orchestrator.
#[derive(Debug)]
pub struct TransferProcess {
    pub id: ProcessId,
    pub mode: TransferMode,
    pub sources: Vec<TransferSource>,
    pub destination: PathBuf,
    pub total_bytes: Arc<AtomicU64>,
    pub processed_bytes: Arc<AtomicU64>,
    pub per_source: Arc<DashMap<FileId, u64>>,
    pub status: TransferStatus,
    pub error: Option<String>,
    pub cancel_requested: Arc<AtomicBool>,
    pub started_at: Instant,
}

impl TransferProcess {
    pub fn new(mode: TransferMode, sources: Vec<PathBuf>, destination: PathBuf) -> Self {
        Self {
            id: ProcessId::new(),
            mode,
            sources: sources.into_iter().map(TransferSource::from_path).collect(),
            destination,
            total_bytes: Arc::new(AtomicU64::new(0)),
            processed_bytes: Arc::new(AtomicU64::new(0)),
            per_source: Arc::new(DashMap::new()),
            status: TransferStatus::Running,
            error: None,
            cancel_requested: Arc::new(AtomicBool::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        // Load processed before total: total only grows ahead of processed,
        // so this ordering keeps processed <= total in every snapshot.
        let processed = self.processed_bytes.load(Ordering::Acquire);
        let total = self.total_bytes.load(Ordering::Acquire);
        let processed = if self.status == TransferStatus::Failure {
            processed
        } else {
            processed.min(total)
        };

        TransferSnapshot {
            id: self.id.clone(),
            mode: self.mode,
            source_names: self.sources.iter().map(|s| s.name.clone()).collect(),
            destination: self.destination.to_string_lossy().to_string(),
            total_bytes: total,
            processed_bytes: processed,
            per_source: self
                .per_source
                .iter()
                .map(|kv| (kv.key().to_string(), *kv.value()))
                .collect(),
            status: self.status,
            error: self.error.clone(),
            cancellation_requested: self.cancel_requested.load(Ordering::Acquire),
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// One delete target, captured at creation for display.
#[derive(Debug, Clone)]
pub struct DeleteTarget {
    pub path: PathBuf,
    pub name: String,
}

impl DeleteTarget {
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self { path, name }
    }
}

/// State of one deletion batch.
#[derive(Debug)]
pub struct DeleteProcess {
    pub id: ProcessId,
    pub targets: Vec<DeleteTarget>,
    pub status: DeleteStatus,
    pub error: Option<String>,
    /// Set once the user (or pre-authorization) picked trash vs. permanent.
    pub use_trash: Option<bool>,
    pub started_at: Instant,
}

impl DeleteProcess {
    pub fn new(targets: Vec<PathBuf>) -> Self {
        Self {
            id: ProcessId::new(),
            targets: targets.into_iter().map(DeleteTarget::from_path).collect(),
            status: DeleteStatus::PendingUserInput,
            error: None,
            use_trash: None,
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> DeleteSnapshot {
        DeleteSnapshot {
            id: self.id.clone(),
            target_names: self.targets.iter().map(|t| t.name.clone()).collect(),
            status: self.status,
            error: self.error.clone(),
            use_trash: self.use_trash,
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// A tracked process: paste or delete. Matched exhaustively everywhere.
#[derive(Debug)]
pub enum Process {
    Paste(TransferProcess),
    Delete(DeleteProcess),
}

impl Process {
    pub fn id(&self) -> &ProcessId {
        match self {
            Process::Paste(p) => &p.id,
            Process::Delete(p) => &p.id,
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Process::Paste(p) => p.status == TransferStatus::Running,
            Process::Delete(p) => p.status == DeleteStatus::Running,
        }
    }

    /// Removal is valid from PendingUserInput and terminal states only.
    pub fn is_removable(&self) -> bool {
        !self.is_running()
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        match self {
            Process::Paste(p) => ProcessSnapshot::Paste(p.snapshot()),
            Process::Delete(p) => ProcessSnapshot::Delete(p.snapshot()),
        }
    }
}

/// Immutable snapshot of a transfer process
#[derive(Debug, Clone, Serialize)]
pub struct TransferSnapshot {
    pub id: ProcessId,
    pub mode: TransferMode,
    pub source_names: Vec<String>,
    pub destination: String,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub per_source: HashMap<String, u64>,
    pub status: TransferStatus,
    pub error: Option<String>,
    pub cancellation_requested: bool,
    pub elapsed_ms: u64,
}

/// Immutable snapshot of a delete process
#[derive(Debug, Clone, Serialize)]
pub struct DeleteSnapshot {
    pub id: ProcessId,
    pub target_names: Vec<String>,
    pub status: DeleteStatus,
    pub error: Option<String>,
    pub use_trash: Option<bool>,
    pub elapsed_ms: u64,
}

/// Snapshot of any process kind
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum ProcessSnapshot {
    Paste(TransferSnapshot),
    Delete(DeleteSnapshot),
}

impl ProcessSnapshot {
    pub fn id(&self) -> &ProcessId {
        match self {
            ProcessSnapshot::Paste(s) => &s.id,
            ProcessSnapshot::Delete(s) => &s.id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ProcessSnapshot::Paste(s) => s.status.is_terminal(),
            ProcessSnapshot::Delete(s) => s.status.is_terminal(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProcessSnapshot::Paste(s) => s.error.as_deref(),
            ProcessSnapshot::Delete(s) => s.error.as_deref(),
        }
    }
}
