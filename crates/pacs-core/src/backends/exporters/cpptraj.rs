use super::Endpoints;
use crate::backends::traits::Exporter;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::models::snapshot::Snapshot;
use crate::core::utils::command::{ShellCommand, quote_path};
use crate::engine::config::PacsConfig;
use crate::engine::error::EngineError;

pub struct CpptrajExporter;

impl CpptrajExporter {
    /// Input script writing frame `snapshot.frame` (0-based) as the next starting structure.
    fn script(
        config: &PacsConfig,
        direction: Direction,
        snapshot: &Snapshot,
        ends: &Endpoints,
    ) -> String {
        let mut lines = vec![
            format!("parm {}", config.simulation.inputs(direction).topology.display()),
            format!("trajin {}", ends.trajectory.display()),
        ];
        if config.export.centering {
            lines.push(format!("center {}", config.export.centering_selection));
            lines.push("image".to_string());
        }
        lines.push(format!(
            "trajout {} onlyframes {}",
            ends.output.display(),
            snapshot.frame + 1
        ));
        lines.extend(["run", "clear all", "quit"].map(String::from));
        lines.join("\n") + "\n"
    }
}

impl Exporter for CpptrajExporter {
    fn export_snapshot(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        snapshot: &Snapshot,
        target: ReplicaId,
    ) -> Result<(), EngineError> {
        let ends = Endpoints::resolve(config, cycle, direction, snapshot, target);
        let script_path = ends.target_dir.join("export.cpptraj");
        std::fs::write(&script_path, Self::script(config, direction, snapshot, &ends))
            .map_err(|e| EngineError::io(&script_path, e))?;
        ShellCommand::new(format!("cpptraj -i {}", quote_path(&script_path)))
            .with_log(ends.target_dir.join("export.log"))
            .run()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::tests::gromacs_builder;
    use crate::engine::config::{AnalyzerTool, SimulatorKind};

    fn amber_config(centering: bool) -> PacsConfig {
        gromacs_builder()
            .simulator(SimulatorKind::Amber)
            .analyzer_tool(AnalyzerTool::Cpptraj)
            .trajectory_extension(".nc")
            .centering(centering)
            .working_dir("/w".into())
            .build()
            .unwrap()
    }

    #[test]
    fn centered_script_images_before_writing_one_frame() {
        let config = amber_config(true);
        let snapshot = Snapshot::new(Direction::Back, 2, 4, 1.0);
        let ends = Endpoints::resolve(&config, 1, Direction::Back, &snapshot, 3);
        let script = CpptrajExporter::script(&config, Direction::Back, &snapshot, &ends);

        assert_eq!(
            script,
            "parm topol.top\n\
             trajin /w/trial001/cycle001/back/replica002/prd.nc\n\
             center @CA,C,O,N,H\n\
             image\n\
             trajout /w/trial001/cycle002/back/replica003/input.gro onlyframes 5\n\
             run\n\
             clear all\n\
             quit\n"
        );
    }

    #[test]
    fn uncentered_script_skips_imaging() {
        let config = amber_config(false);
        let snapshot = Snapshot::new(Direction::Fore, 1, 0, 1.0);
        let ends = Endpoints::resolve(&config, 0, Direction::Fore, &snapshot, 1);
        let script = CpptrajExporter::script(&config, Direction::Fore, &snapshot, &ends);
        assert!(!script.contains("image"));
        assert!(script.contains("onlyframes 1\n"));
    }
}
