//! FilePorter Batch File Transfer Engine
//!
//! Turns a set of source entries plus a destination directory into tracked,
//! cancellable, observable processes:
//! - PathNamer: deterministic destination-name collision resolution
//! - TreeResolver: concurrent subtree expansion into leaf files
//! - TransferProcess / DeleteProcess: per-batch state machines
//! - Orchestrator: process registry, progress aggregation, event publishing

mod config;
mod error;
pub mod namer;
mod orchestrator;
mod process;
mod resolver;
pub mod tags;

pub use config::{EngineConfig, EventConfig, TransferConfig};
pub use error::{EngineError, Result};
pub use orchestrator::{DeleteOptions, Orchestrator, ProcessEvent};
pub use process::{
    DeleteProcess, DeleteSnapshot, DeleteStatus, Process, ProcessId, ProcessSnapshot,
    TransferMode, TransferProcess, TransferSnapshot, TransferStatus,
};
pub use resolver::{resolve_deep, total_size, FileTreeMap};
pub use tags::{MemoryTagStore, TagId, TagStore};

use porter_fs::{FsProvider, LocalFs};
use std::sync::Arc;

/// Build an orchestrator over the local disk with an in-memory tag store.
pub fn init(config: EngineConfig) -> Orchestrator {
    Orchestrator::new(
        Arc::new(LocalFs::with_chunk_size(config.transfer.copy_chunk_size)),
        Arc::new(MemoryTagStore::new()),
        config,
    )
}

/// Build an orchestrator over custom collaborators.
pub fn init_with(
    provider: Arc<dyn FsProvider>,
    tags: Arc<dyn TagStore>,
    config: EngineConfig,
) -> Orchestrator {
    Orchestrator::new(provider, tags, config)
}
