use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use pacskit::backends::Collaborators;
use pacskit::engine::config::PacsConfig;
use pacskit::engine::cycle::Termination;
use pacskit::engine::progress::ProgressReporter;
use pacskit::workflows::{self, trial::TrialResult};
use tokio::sync::mpsc;
use tokio::task;
use tracing::info;

pub async fn run(config: PacsConfig, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let progress_handler = CliProgressHandler::new(ui_sender);
    let callback = progress_handler.get_callback();

    println!(
        "Starting trial {} in {} ({} replicas, up to cycle {})...",
        config.trial,
        config.layout().trial_dir().display(),
        config.n_replica,
        config.max_cycle
    );
    info!(
        simulator = %config.simulation.simulator,
        analyzer = config.analysis.tool.name(),
        exporter = config.export.tool.name(),
        evaluation = %config.analysis.evaluation,
        "Invoking the trial workflow..."
    );

    let result = task::spawn_blocking(move || {
        let collaborators = Collaborators::from_config(&config);
        let reporter = ProgressReporter::with_callback(callback);
        workflows::trial::run(&config, &collaborators, &reporter)
    })
    .await
    .map_err(|e| CliError::Other(anyhow::anyhow!("Trial task failed: {}", e)))??;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &TrialResult) {
    match result.reason {
        Termination::Threshold { direction } => println!(
            "✓ Threshold reached by the {} direction at cycle {}.",
            direction, result.last_cycle
        ),
        Termination::MaxCycle => println!(
            "Reached the last cycle ({}) without meeting the threshold.",
            result.last_cycle
        ),
    }
    for (direction, ranked) in result.ranked.iter() {
        match ranked.first() {
            Some(best) => println!("  best {}: {}", direction, best),
            None => println!("  best {}: (no snapshots)", direction),
        }
    }
}
