//! pzmm - Mod list manager for Project Zomboid dedicated servers
//!
//! Main entry point for the command line application.
//!
//! # Overview
//!
//! This binary parses the command line and initializes:
//! - Logging infrastructure (file rotation, optional stderr output)
//! - Tokio runtime (background workshop lookups and scans)
//! - Session management ([`SessionManager`])
//! - Settings loading ([`ConfigManager`])
//!
//! and hands the command to [`CliController`].
//!
//! # Configuration Files
//!
//! Expected in `PZ Mod Manager Data/` (override with `--config-dir`):
//! - `PZ Mod Manager.yaml`: Steam API key, workshop path, recent files
//!
//! `PZMM_STEAM_API_KEY`, `PZMM_WORKSHOP_PATH` and `PZMM_DEBUG_MODE` override
//! the file.

use anyhow::Result;
use clap::Parser;
use pzmm::cli::{Cli, CliController};
use pzmm::{APP_NAME, ConfigManager, SessionManager, VERSION};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let settings = config_manager.load_settings()?;

    let _guard = pzmm::logging::setup_logging_with_console(
        cli.log_dir.as_str(),
        pzmm::logging::LOG_PREFIX,
        cli.debug || settings.debug_mode,
        cli.verbose,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("pzmm-worker")
        .build()?;

    let controller = CliController::new(
        SessionManager::new(),
        config_manager,
        runtime.handle().clone(),
    );

    let mut stdout = std::io::stdout().lock();
    let result = controller.run(cli.file.as_deref(), &cli.command, &mut stdout);

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    if let Err(e) = &result {
        tracing::error!("Command failed: {:#}", e);
    }
    result
}
