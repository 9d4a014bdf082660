use super::file::{
    FileAnalysisConfig, FileConfig, FileDirectionInputs, FileSimulationConfig, FileTool,
    apply_set_value,
};
use crate::cli::TrialArgs;
use crate::error::{CliError, Result};
use pacskit::core::models::ids::Direction;
use pacskit::engine::config::{
    AdaptiveConfig, AnalyzerTool, CleanupConfig, DirectionInputs, ExportTool, LaunchConfig,
    PacsConfig, PacsConfigBuilder, SimulatorKind,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Loads the configuration file named by `args`, applies `--set` pairs and the dedicated
/// override flags, and builds the validated core configuration.
///
/// Relative paths are resolved against the current directory.
pub fn build_config(args: &TrialArgs) -> Result<PacsConfig> {
    let mut table = FileConfig::read_table(&args.config)?;
    for kv_pair in &args.set_values {
        debug!("Applying override {}", kv_pair);
        apply_set_value(&mut table, kv_pair)?;
    }
    let file = FileConfig::from_table(table, &args.config)?;

    let mut builder = PacsConfigBuilder::new().trial(args.trial);
    if let Some(max_cycle) = args.max_cycle.or(file.max_cycle) {
        builder = builder.max_cycle(max_cycle);
    }
    if let Some(n_replica) = args.n_replica.or(file.n_replica) {
        builder = builder.n_replica(n_replica);
    }
    if let Some(n_parallel) = args.n_parallel.or(file.n_parallel) {
        builder = builder.n_parallel(n_parallel);
    }
    let working_dir = args
        .working_dir
        .clone()
        .or(file.working_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    builder = builder.working_dir(absolute(working_dir)?);

    let simulator = file.simulation.simulator;
    builder = apply_simulation(builder, file.simulation)?;
    builder = apply_analysis(builder, file.analysis, simulator)?;

    let export = file.export;
    if let Some(tool) = resolve_tool(export.tool, export.script, "export")? {
        builder = builder.export_tool(match tool {
            ResolvedTool::Gromacs => ExportTool::Gromacs,
            ResolvedTool::Cpptraj => ExportTool::Cpptraj,
            ResolvedTool::Script(template) => ExportTool::Script { template },
        });
    }
    if let Some(centering) = export.centering {
        builder = builder.centering(centering);
    }
    if let Some(selection) = export.centering_selection {
        builder = builder.centering_selection(selection);
    }

    builder = builder.cleanup(CleanupConfig {
        remove_intermediates: file.cleanup.remove_intermediates.unwrap_or(false),
        reduce_command: file.cleanup.reduce_command,
    });

    let defaults = LaunchConfig::default();
    let launch = file.launch;
    builder = builder.launch(LaunchConfig {
        max_attempts: launch.max_attempts.unwrap_or(defaults.max_attempts),
        liveness_timeout: seconds(launch.liveness_timeout_secs, "launch.liveness-timeout-secs")?
            .unwrap_or(defaults.liveness_timeout),
        cooldown: seconds(launch.cooldown_secs, "launch.cooldown-secs")?
            .unwrap_or(defaults.cooldown),
        poll_interval: launch
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval),
    });

    Ok(builder.build()?)
}

fn apply_simulation(
    mut builder: PacsConfigBuilder,
    simulation: FileSimulationConfig,
) -> Result<PacsConfigBuilder> {
    if let Some(simulator) = simulation.simulator {
        builder = builder.simulator(simulator);
    }
    if let Some(extension) = simulation.trajectory_extension {
        builder = builder.trajectory_extension(extension);
    }
    if let Some(cmd) = simulation.cmd_mpi {
        builder = builder.cmd_mpi(cmd);
    }
    if let Some(cmd) = simulation.cmd_serial {
        builder = builder.cmd_serial(cmd);
    }
    if let Some(cmd) = simulation.cmd_parallel {
        builder = builder.cmd_parallel(cmd);
    }
    if let Some(cmd) = simulation.cmd_gmx {
        builder = builder.cmd_gmx(cmd);
    }
    for (direction, inputs) in [
        (Direction::Fore, simulation.fore),
        (Direction::Back, simulation.back),
    ] {
        if let Some(inputs) = inputs {
            builder = builder.inputs(direction, direction_inputs(inputs)?);
        }
    }
    Ok(builder)
}

fn apply_analysis(
    mut builder: PacsConfigBuilder,
    analysis: FileAnalysisConfig,
    simulator: Option<SimulatorKind>,
) -> Result<PacsConfigBuilder> {
    let tool = match resolve_tool(analysis.analyzer, analysis.script, "analysis")? {
        Some(tool) => Some(tool),
        None => simulator.map(|kind| match kind {
            SimulatorKind::Gromacs => ResolvedTool::Gromacs,
            SimulatorKind::Amber | SimulatorKind::Namd => ResolvedTool::Cpptraj,
        }),
    };
    if let Some(tool) = tool {
        builder = builder.analyzer_tool(match tool {
            ResolvedTool::Gromacs => AnalyzerTool::Gromacs,
            ResolvedTool::Cpptraj => AnalyzerTool::Cpptraj,
            ResolvedTool::Script(template) => AnalyzerTool::Script { template },
        });
    }
    if let Some(evaluation) = analysis.evaluation {
        builder = builder.evaluation(evaluation);
    }
    if let Some(threshold) = analysis.threshold {
        builder = builder.threshold(threshold);
    }
    if let Some(stride) = analysis.skip_frame {
        builder = builder.skip_frame(stride);
    }
    if let Some(reference) = analysis.reference {
        builder = builder.reference(absolute(reference)?);
    }
    for (index, selection) in [
        analysis.selection1,
        analysis.selection2,
        analysis.selection3,
        analysis.selection4,
    ]
    .into_iter()
    .enumerate()
    {
        if let Some(selection) = selection {
            builder = builder.selection(index + 1, selection);
        }
    }
    if let Some(nojump) = analysis.nojump {
        builder = builder.nojump(nojump);
    }
    if let Some(adaptive) = analysis.adaptive {
        builder = builder.adaptive(AdaptiveConfig {
            reverse_bound: adaptive.reverse_bound,
            frame_window: adaptive.frame_window,
            bound_patience: adaptive.bound_patience,
        });
    }
    Ok(builder)
}

enum ResolvedTool {
    Gromacs,
    Cpptraj,
    Script(String),
}

/// A `script` template alone selects the script tool; naming `script` without a template is an
/// error.
fn resolve_tool(
    tool: Option<FileTool>,
    script: Option<String>,
    section: &str,
) -> Result<Option<ResolvedTool>> {
    match (tool, script) {
        (None, None) => Ok(None),
        (None | Some(FileTool::Script), Some(template)) => Ok(Some(ResolvedTool::Script(template))),
        (Some(FileTool::Script), None) => Err(CliError::Config(format!(
            "`{}` selects the script tool but has no `script` template",
            section
        ))),
        (Some(FileTool::Gromacs), _) => Ok(Some(ResolvedTool::Gromacs)),
        (Some(FileTool::Cpptraj), _) => Ok(Some(ResolvedTool::Cpptraj)),
    }
}

fn direction_inputs(inputs: FileDirectionInputs) -> Result<DirectionInputs> {
    Ok(DirectionInputs {
        structure: absolute(inputs.structure)?,
        topology: absolute(inputs.topology)?,
        mdconf: absolute(inputs.mdconf)?,
        index_file: inputs.index_file.map(absolute).transpose()?,
    })
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).map_err(|source| CliError::Io { path, source })
}

fn seconds(value: Option<f64>, key: &str) -> Result<Option<Duration>> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| CliError::Config(format!("Invalid value for '{}': {}", key, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacskit::engine::config::EvaluationType;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const GROMACS_TOML: &str = r#"
        max-cycle = 30
        n-replica = 8
        n-parallel = 4
        working-dir = "runs"

        [simulation]
        simulator = "gromacs"
        trajectory-extension = "xtc"
        cmd-serial = "gmx_mpi mdrun -ntomp 4"

        [simulation.fore]
        structure = "reactant.gro"
        topology = "topol.top"
        mdconf = "md.mdp"
        index-file = "index.ndx"

        [simulation.back]
        structure = "product.gro"
        topology = "topol.top"
        mdconf = "md.mdp"
        index-file = "index.ndx"

        [analysis]
        type = "rmsd"
        threshold = 0.1
        reference = "ref.gro"
        selection1 = "Backbone"
        selection2 = "Backbone"
    "#;

    fn args(config: &Path) -> TrialArgs {
        TrialArgs {
            trial: 1,
            config: config.to_path_buf(),
            max_cycle: None,
            n_replica: None,
            n_parallel: None,
            working_dir: None,
            set_values: vec![],
        }
    }

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("input.toml");
        fs::write(&path, content).unwrap();
        path
    }

    mod merging {
        use super::*;

        #[test]
        fn file_values_build_a_core_config() {
            let dir = tempdir().unwrap();
            let config = build_config(&args(&write_config(dir.path(), GROMACS_TOML))).unwrap();

            assert_eq!(config.trial, 1);
            assert_eq!(config.max_cycle, 30);
            assert_eq!(config.n_replica, 8);
            assert_eq!(config.n_parallel, 4);
            assert!(config.working_dir.is_absolute());
            assert!(config.working_dir.ends_with("runs"));
            assert_eq!(config.simulation.trajectory_extension, ".xtc");
            assert_eq!(config.simulation.gmx(), "gmx_mpi");
            assert!(config.simulation.fore.structure.is_absolute());
            assert_eq!(config.analysis.tool, AnalyzerTool::Gromacs);
            assert_eq!(config.analysis.evaluation, EvaluationType::Rmsd);
            assert_eq!(config.export.tool, ExportTool::Gromacs);
            assert_eq!(config.launch, LaunchConfig::default());
        }

        #[test]
        fn command_line_overrides_win_over_the_file() {
            let dir = tempdir().unwrap();
            let mut args = args(&write_config(dir.path(), GROMACS_TOML));
            args.max_cycle = Some(5);
            args.n_parallel = Some(1);
            args.working_dir = Some(dir.path().to_path_buf());
            args.set_values = vec![
                "analysis.threshold=0.3".into(),
                "launch.max-attempts=3".into(),
                "cleanup.reduce-command=gmx trjconv -f {trajectory}".into(),
            ];

            let config = build_config(&args).unwrap();

            assert_eq!(config.max_cycle, 5);
            assert_eq!(config.n_parallel, 1);
            assert_eq!(config.working_dir, dir.path());
            assert_eq!(config.analysis.threshold, Some(0.3));
            assert_eq!(config.launch.max_attempts, 3);
            assert_eq!(
                config.cleanup.reduce_command.as_deref(),
                Some("gmx trjconv -f {trajectory}")
            );
        }

        #[test]
        fn script_template_selects_the_script_tools() {
            let dir = tempdir().unwrap();
            let content = format!(
                "{}\nscript = \"./cv.sh {{trajectory}}\"\n\n[export]\nscript = \"./seed.sh {{output}}\"\ncentering = false\n",
                GROMACS_TOML
            );
            let config = build_config(&args(&write_config(dir.path(), &content))).unwrap();

            assert_eq!(
                config.analysis.tool,
                AnalyzerTool::Script {
                    template: "./cv.sh {trajectory}".into()
                }
            );
            assert_eq!(
                config.export.tool,
                ExportTool::Script {
                    template: "./seed.sh {output}".into()
                }
            );
            assert!(!config.export.centering);
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn missing_required_value_is_a_config_error() {
            let dir = tempdir().unwrap();
            let content = GROMACS_TOML.replace("n-replica = 8", "");
            let err = build_config(&args(&write_config(dir.path(), &content))).unwrap_err();
            assert!(matches!(err, CliError::Config(msg) if msg.contains("n_replica")));
        }

        #[test]
        fn script_tool_without_template_is_rejected() {
            let dir = tempdir().unwrap();
            let content = GROMACS_TOML.replace("[analysis]", "[analysis]\nanalyzer = \"script\"");
            let err = build_config(&args(&write_config(dir.path(), &content))).unwrap_err();
            assert!(matches!(err, CliError::Config(msg) if msg.contains("script")));
        }

        #[test]
        fn negative_durations_are_rejected() {
            let dir = tempdir().unwrap();
            let content = format!("{}\n[launch]\ncooldown-secs = -1.0\n", GROMACS_TOML);
            let err = build_config(&args(&write_config(dir.path(), &content))).unwrap_err();
            assert!(matches!(err, CliError::Config(msg) if msg.contains("cooldown")));
        }
    }
}
