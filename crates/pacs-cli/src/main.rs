mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod ui;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::ui::UiManager;
use clap::Parser;
use tokio::task;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_app() -> Result<()> {
    let cli = Cli::parse();

    // Configuration is needed first: the run log lives inside the working directory.
    let (args, is_run) = match &cli.command {
        Commands::Run(args) => (args, true),
        Commands::Status(args) => (args, false),
    };
    let pacs_config = config::build_config(args)?;
    let log_file = match &cli.log_file {
        Some(path) => Some(path.clone()),
        None if is_run => Some(pacs_config.layout().run_log()),
        None => None,
    };

    let (ui_manager, ui_sender, shutdown_sender) = UiManager::new();
    let ui_handle = task::spawn(ui_manager.run());

    logging::setup_logging(
        cli.verbose,
        cli.quiet,
        log_file.as_deref(),
        ui_sender.clone(),
    )?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    let command_result = async {
        info!("🚀 PaCS CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
        debug!("Full CLI arguments parsed: {:?}", &cli);
        debug!("Resolved configuration: {:?}", &pacs_config);

        match cli.command {
            Commands::Run(_) => {
                info!("Dispatching to 'run' command.");
                commands::run::run(pacs_config, ui_sender).await
            }
            Commands::Status(_) => {
                info!("Dispatching to 'status' command.");
                commands::status::run(pacs_config).await
            }
        }
    }
    .await;

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
        }
    }

    if shutdown_sender.send(true).is_err() {
        warn!("UI manager may have already exited before shutdown signal.");
    }

    ui_handle
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("UI manager task failed: {}", e)))?;

    command_result
}
