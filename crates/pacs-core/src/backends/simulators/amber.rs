use super::{command_line, mpi_prefix};
use crate::backends::traits::Simulator;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::utils::command::{ShellCommand, quote_path};
use crate::engine::config::PacsConfig;
use crate::engine::error::EngineError;
use crate::engine::launch::LaunchPlan;
use std::path::Path;

pub struct Amber;

/// `pmemd`/`sander` arguments of one replica, shared by single runs and groupfile lines.
fn run_arguments(config: &PacsConfig, direction: Direction, dir: &Path) -> String {
    let inputs = config.simulation.inputs(direction);
    let structure_ext = &config.simulation.structure_extension;
    format!(
        "-O -i {mdin} -p {top} -c {input} -o {mdout} -r {restart} -inf {mdinfo} -x {traj}",
        mdin = quote_path(&inputs.mdconf),
        top = quote_path(&inputs.topology),
        input = quote_path(&dir.join(format!("input{}", structure_ext))),
        mdout = quote_path(&dir.join("prd.mdout")),
        restart = quote_path(&dir.join(format!("prd{}", structure_ext))),
        mdinfo = quote_path(&dir.join("prd.mdinfo")),
        traj = quote_path(&dir.join(format!("prd{}", config.simulation.trajectory_extension))),
    )
}

impl Simulator for Amber {
    fn name(&self) -> &'static str {
        "amber"
    }

    fn segment_plan(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<LaunchPlan, EngineError> {
        let dir = config.layout().replica_dir(cycle, direction, replica);
        let arguments = run_arguments(config, direction, &dir);
        let script = command_line([
            mpi_prefix(config),
            config.simulation.cmd_serial.as_str(),
            arguments.as_str(),
        ]);
        Ok(LaunchPlan::new(
            ShellCommand::new(script).with_log(dir.join("prd.log")),
        ))
    }

    fn batch_plan(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replicas: &[ReplicaId],
    ) -> Result<Option<LaunchPlan>, EngineError> {
        let layout = config.layout();
        let Some(&first) = replicas.first() else {
            return Ok(None);
        };
        let first_dir = layout.replica_dir(cycle, direction, first);
        let groupfile = first_dir.join("groupfile.txt");

        let mut lines = String::new();
        for &replica in replicas {
            let dir = layout.replica_dir(cycle, direction, replica);
            lines.push_str(&run_arguments(config, direction, &dir));
            lines.push('\n');
        }
        std::fs::write(&groupfile, lines).map_err(|e| EngineError::io(&groupfile, e))?;

        let count = replicas.len().to_string();
        let groupfile_arg = quote_path(&groupfile);
        let script = command_line([
            mpi_prefix(config),
            config.simulation.cmd_parallel.as_str(),
            "-ng",
            count.as_str(),
            "-groupfile",
            groupfile_arg.as_str(),
        ]);
        Ok(Some(LaunchPlan::new(
            ShellCommand::new(script).with_log(first_dir.join("prd.log")),
        )))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn cleanup_patterns(&self, _config: &PacsConfig, _cycle: CycleIndex) -> Vec<String> {
        vec![
            "prd.mdinfo".to_string(),
            "prd.log".to_string(),
            "prd.rst7".to_string(),
        ]
    }
}
