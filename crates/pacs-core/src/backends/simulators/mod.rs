//! Command-line builders for the supported MD engines.

pub mod amber;
pub mod gromacs;
pub mod namd;

use super::traits::Simulator;
use crate::engine::config::{PacsConfig, SimulatorKind};

pub fn from_config(config: &PacsConfig) -> Box<dyn Simulator> {
    match config.simulation.simulator {
        SimulatorKind::Gromacs => Box::new(gromacs::Gromacs),
        SimulatorKind::Amber => Box::new(amber::Amber),
        SimulatorKind::Namd => Box::new(namd::Namd),
    }
}

/// Joins non-empty command fragments with single spaces.
pub(crate) fn command_line<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn mpi_prefix(config: &PacsConfig) -> &str {
    config.simulation.cmd_mpi.as_deref().unwrap_or("")
}
