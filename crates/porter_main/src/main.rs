//! FilePorter - Batch file transfer engine for desktop file managers
//!
//! Main entry point for the command-line driver.

mod app;

use anyhow::Result;

fn main() -> Result<()> {
    // Initialize logging and panic hook first
    porter_log::init()?;

    // Clean up old logs (7 days)
    if let Err(e) = porter_log::cleanup_old_logs(7) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    tracing::info!("FilePorter starting...");

    // Load configuration
    let config = porter_core::EngineConfig::load().unwrap_or_default();

    // Run the requested batch
    app::run(config)
}
