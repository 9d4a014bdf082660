//! # Backends Module
//!
//! Adapters between the cycle engine and the external programs a trial drives: the MD engine
//! ([`simulators`]), the CV analysis tool ([`analyzer`]) and the frame extraction tool
//! ([`exporters`]). Every adapter sits behind one of the traits in [`traits`], so the engine
//! can be exercised with in-process stand-ins.

pub mod analyzer;
pub mod exporters;
pub mod simulators;
pub mod traits;

pub use traits::{Analyzer, Collaborators, Exporter, Simulator};

use crate::engine::config::PacsConfig;

impl Collaborators {
    /// Chooses the backends named by `config`.
    pub fn from_config(config: &PacsConfig) -> Self {
        Self {
            simulator: simulators::from_config(config),
            analyzer: Box::new(analyzer::ToolAnalyzer::from_config(config)),
            exporter: exporters::from_config(config),
        }
    }
}
