use super::{command_line, mpi_prefix};
use crate::backends::traits::Simulator;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::utils::command::{ShellCommand, quote_path};
use crate::engine::config::PacsConfig;
use crate::engine::error::EngineError;
use crate::engine::launch::LaunchPlan;
use std::path::Path;

pub struct Gromacs;

impl Gromacs {
    fn grompp(
        config: &PacsConfig,
        direction: Direction,
        dir: &Path,
    ) -> Result<ShellCommand, EngineError> {
        let inputs = config.simulation.inputs(direction);
        let index = inputs.index_file.as_deref().ok_or_else(|| {
            EngineError::Unsupported(format!("gromacs {} run without an index file", direction))
        })?;
        let input = dir.join(format!("input{}", config.simulation.structure_extension));
        let script = format!(
            "{gmx} grompp -f {mdp} -o {tpr} -p {top} -c {input} -n {ndx} -po {mdout} -maxwarn 10",
            gmx = config.simulation.gmx(),
            mdp = quote_path(&inputs.mdconf),
            tpr = quote_path(&dir.join("prd.tpr")),
            top = quote_path(&inputs.topology),
            input = quote_path(&input),
            ndx = quote_path(index),
            mdout = quote_path(&dir.join("mdout.mdp")),
        );
        Ok(ShellCommand::new(script).with_log(dir.join("grompp.log")))
    }
}

impl Simulator for Gromacs {
    fn name(&self) -> &'static str {
        "gromacs"
    }

    fn segment_plan(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<LaunchPlan, EngineError> {
        let dir = config.layout().replica_dir(cycle, direction, replica);
        let deffnm = quote_path(&dir.join("prd"));
        let mdrun = command_line([
            mpi_prefix(config),
            config.simulation.cmd_serial.as_str(),
            "-deffnm",
            deffnm.as_str(),
        ]);
        Ok(
            LaunchPlan::new(ShellCommand::new(mdrun).with_log(dir.join("mdrun.log")))
                .with_setup(Self::grompp(config, direction, &dir)?)
                .with_liveness(dir.join("prd.log")),
        )
    }

    fn batch_plan(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replicas: &[ReplicaId],
    ) -> Result<Option<LaunchPlan>, EngineError> {
        let layout = config.layout();
        let dirs: Vec<_> = replicas
            .iter()
            .map(|&replica| layout.replica_dir(cycle, direction, replica))
            .collect();
        let Some(first) = dirs.first() else {
            return Ok(None);
        };

        let multidir = dirs.iter().map(|d| quote_path(d)).collect::<Vec<_>>().join(" ");
        let mdrun = command_line([
            mpi_prefix(config),
            config.simulation.cmd_parallel.as_str(),
            "-multidir",
            multidir.as_str(),
            "-deffnm prd",
        ]);
        let mut plan = LaunchPlan::new(ShellCommand::new(mdrun).with_log(first.join("mdrun.log")));
        for dir in &dirs {
            plan = plan
                .with_setup(Self::grompp(config, direction, dir)?)
                .with_liveness(dir.join("prd.log"));
        }
        Ok(Some(plan))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn includes_initial_frame(&self) -> bool {
        true
    }

    fn cleanup_patterns(&self, config: &PacsConfig, cycle: CycleIndex) -> Vec<String> {
        let mut patterns = vec![
            "mdout.mdp".to_string(),
            "*.cpt".to_string(),
            "#*#".to_string(),
            "prd.gro".to_string(),
        ];
        // Run inputs stay around for a later reduction pass unless one already ran.
        if cycle != 0 && config.cleanup.reduce_command.is_some() {
            patterns.push("prd.tpr".to_string());
        }
        patterns
    }
}
