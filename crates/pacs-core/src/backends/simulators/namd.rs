use super::{command_line, mpi_prefix};
use crate::backends::traits::Simulator;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::utils::command::{ShellCommand, quote_path};
use crate::engine::config::PacsConfig;
use crate::engine::error::EngineError;
use crate::engine::launch::LaunchPlan;

/// NAMD reads everything from its configuration file, which is copied into the replica
/// directory so each run keeps the exact inputs it was started with.
pub struct Namd;

impl Simulator for Namd {
    fn name(&self) -> &'static str {
        "namd"
    }

    fn segment_plan(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<LaunchPlan, EngineError> {
        let dir = config.layout().replica_dir(cycle, direction, replica);
        let conf = quote_path(&dir.join("prd.conf"));
        let copy = ShellCommand::new(format!(
            "cat {} > {}",
            quote_path(&config.simulation.inputs(direction).mdconf),
            conf
        ));
        let script = command_line([
            mpi_prefix(config),
            config.simulation.cmd_serial.as_str(),
            conf.as_str(),
        ]);
        let main = ShellCommand::new(script).with_log(dir.join("prd.log"));
        Ok(LaunchPlan::new(main).with_setup(copy))
    }
}
