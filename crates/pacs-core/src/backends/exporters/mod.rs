//! Extraction of ranked frames into the next cycle's replica directories.

pub mod cpptraj;
pub mod gromacs;
pub mod script;

use super::traits::Exporter;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::models::snapshot::Snapshot;
use crate::engine::config::{ExportTool, PacsConfig};
use std::path::PathBuf;

pub fn from_config(config: &PacsConfig) -> Box<dyn Exporter> {
    match &config.export.tool {
        ExportTool::Gromacs => Box::new(gromacs::GromacsExporter),
        ExportTool::Cpptraj => Box::new(cpptraj::CpptrajExporter),
        ExportTool::Script { template } => Box::new(script::ScriptExporter::new(template.clone())),
    }
}

/// Source and destination replica directories of one export.
pub(crate) struct Endpoints {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub trajectory: PathBuf,
    pub output: PathBuf,
}

impl Endpoints {
    pub fn resolve(
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        snapshot: &Snapshot,
        target: ReplicaId,
    ) -> Self {
        let layout = config.layout();
        let simulation = &config.simulation;
        let source_dir = layout.replica_dir(cycle, direction, snapshot.replica);
        let target_dir = layout.replica_dir(cycle + 1, direction, target);
        Self {
            trajectory: source_dir.join(format!("prd{}", simulation.trajectory_extension)),
            output: target_dir.join(format!("input{}", simulation.structure_extension)),
            source_dir,
            target_dir,
        }
    }
}
