use super::Endpoints;
use crate::backends::analyzer::fill;
use crate::backends::traits::Exporter;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::models::snapshot::Snapshot;
use crate::core::utils::command::{ShellCommand, quote_path};
use crate::engine::config::PacsConfig;
use crate::engine::error::EngineError;

/// Runs a user command template per exported snapshot.
///
/// Placeholders: `{cycle}`, `{direction}`, `{frame}` (0-based), `{source_dir}`, `{target_dir}`,
/// `{trajectory}`, `{topology}` and `{output}`. The command must create `{output}`.
pub struct ScriptExporter {
    template: String,
}

impl ScriptExporter {
    pub fn new(template: String) -> Self {
        Self { template }
    }
}

impl Exporter for ScriptExporter {
    fn export_snapshot(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        snapshot: &Snapshot,
        target: ReplicaId,
    ) -> Result<(), EngineError> {
        let ends = Endpoints::resolve(config, cycle, direction, snapshot, target);
        let script = fill(
            &self.template,
            &[
                ("cycle", cycle.to_string()),
                ("direction", direction.to_string()),
                ("frame", snapshot.frame.to_string()),
                ("source_dir", quote_path(&ends.source_dir)),
                ("target_dir", quote_path(&ends.target_dir)),
                ("trajectory", quote_path(&ends.trajectory)),
                ("topology", quote_path(&config.simulation.inputs(direction).topology)),
                ("output", quote_path(&ends.output)),
            ],
        );
        ShellCommand::new(script)
            .with_log(ends.target_dir.join("export.log"))
            .run()?;
        std::fs::metadata(&ends.output).map_err(|e| EngineError::io(&ends.output, e))?;
        Ok(())
    }
}
