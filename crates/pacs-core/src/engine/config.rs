use crate::core::layout::TrialLayout;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId, TrialId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const MAX_INDEX: u32 = 999;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {reason}")]
    Invalid {
        parameter: &'static str,
        reason: String,
    },
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        parameter,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorKind {
    Gromacs,
    Amber,
    Namd,
}

impl SimulatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulatorKind::Gromacs => "gromacs",
            SimulatorKind::Amber => "amber",
            SimulatorKind::Namd => "namd",
        }
    }
}

impl fmt::Display for SimulatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimulatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gromacs" => Ok(SimulatorKind::Gromacs),
            "amber" => Ok(SimulatorKind::Amber),
            "namd" => Ok(SimulatorKind::Namd),
            other => Err(invalid(
                "simulator",
                format!("'{}' is not one of gromacs, amber, namd", other),
            )),
        }
    }
}

/// External program used to turn trajectories into collective-variable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerTool {
    Gromacs,
    Cpptraj,
    /// A user command template; see [`crate::backends::analyzer`] for its placeholders.
    Script { template: String },
}

impl AnalyzerTool {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyzerTool::Gromacs => "gromacs",
            AnalyzerTool::Cpptraj => "cpptraj",
            AnalyzerTool::Script { .. } => "script",
        }
    }
}

/// External program used to extract a ranked frame as the next cycle's starting structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTool {
    Gromacs,
    Cpptraj,
    Script { template: String },
}

impl ExportTool {
    pub fn name(&self) -> &'static str {
        match self {
            ExportTool::Gromacs => "gromacs",
            ExportTool::Cpptraj => "cpptraj",
            ExportTool::Script { .. } => "script",
        }
    }

    fn default_centering_selection(&self) -> &'static str {
        match self {
            ExportTool::Gromacs => "Protein",
            ExportTool::Cpptraj => "@CA,C,O,N,H",
            ExportTool::Script { .. } => "protein",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationType {
    Target,
    Rmsd,
    Association,
    Dissociation,
    AssociationDissociation,
    BidirectionalRmsd,
    EdgeExpansion,
}

impl EvaluationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationType::Target => "target",
            EvaluationType::Rmsd => "rmsd",
            EvaluationType::Association => "association",
            EvaluationType::Dissociation => "dissociation",
            EvaluationType::AssociationDissociation => "association-dissociation",
            EvaluationType::BidirectionalRmsd => "bidirectional-rmsd",
            EvaluationType::EdgeExpansion => "edge-expansion",
        }
    }

    /// Scored on fore/back replica pairs rather than on each replica alone.
    pub fn is_pairwise(&self) -> bool {
        matches!(self, EvaluationType::BidirectionalRmsd)
    }

    pub fn requires_threshold(&self) -> bool {
        !matches!(
            self,
            EvaluationType::AssociationDissociation | EvaluationType::EdgeExpansion
        )
    }

    /// Ranks CV vectors by their position rather than by a single value.
    pub fn ranks_vectors(&self) -> bool {
        matches!(self, EvaluationType::EdgeExpansion)
    }

    /// Needs a CV recipe the built-in analyzers do not have.
    pub fn requires_script(&self) -> bool {
        self.is_pairwise() || self.ranks_vectors()
    }

    pub fn requires_reference(&self) -> bool {
        matches!(self, EvaluationType::Target | EvaluationType::Rmsd)
    }
}

impl fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let parsed = match normalized.as_str() {
            "target" => EvaluationType::Target,
            "rmsd" => EvaluationType::Rmsd,
            "association" => EvaluationType::Association,
            "dissociation" => EvaluationType::Dissociation,
            "association-dissociation" | "a-d" => EvaluationType::AssociationDissociation,
            "bidirectional-rmsd" | "bd-rmsd" => EvaluationType::BidirectionalRmsd,
            "edge-expansion" | "ee" => EvaluationType::EdgeExpansion,
            _ => return Err(invalid("type", format!("unknown evaluation type '{}'", s))),
        };
        Ok(parsed)
    }
}

/// Input files of one evolution direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionInputs {
    pub structure: PathBuf,
    pub topology: PathBuf,
    pub mdconf: PathBuf,
    pub index_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub simulator: SimulatorKind,
    pub fore: DirectionInputs,
    pub back: DirectionInputs,
    /// Extension of trajectory files, including the leading dot (e.g. `.xtc`).
    pub trajectory_extension: String,
    /// Extension shared by both start structures, including the leading dot.
    pub structure_extension: String,
    pub cmd_mpi: Option<String>,
    pub cmd_serial: String,
    pub cmd_parallel: String,
    /// `gmx` executable, derived from `cmd_serial` for GROMACS when not given.
    pub cmd_gmx: Option<String>,
}

impl SimulationConfig {
    pub fn inputs(&self, direction: Direction) -> &DirectionInputs {
        match direction {
            Direction::Fore => &self.fore,
            Direction::Back => &self.back,
        }
    }

    pub fn gmx(&self) -> &str {
        self.cmd_gmx.as_deref().unwrap_or("gmx")
    }
}

/// Bounds of the adaptive association/dissociation ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveConfig {
    /// While maximizing, a best CV above this flips the sort to minimizing.
    pub reverse_bound: f64,
    /// While minimizing, a best frame index below this counts as "still bound".
    pub frame_window: usize,
    /// Number of "still bound" cycles that flips the sort back to maximizing.
    pub bound_patience: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub tool: AnalyzerTool,
    pub evaluation: EvaluationType,
    pub threshold: Option<f64>,
    pub skip_frame: usize,
    pub reference: Option<PathBuf>,
    pub selection1: Option<String>,
    pub selection2: Option<String>,
    pub selection3: Option<String>,
    pub selection4: Option<String>,
    pub nojump: bool,
    pub adaptive: Option<AdaptiveConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub tool: ExportTool,
    pub centering: bool,
    pub centering_selection: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupConfig {
    pub remove_intermediates: bool,
    /// Per-replica trajectory reduction command template run after a cycle is exported.
    pub reduce_command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub max_attempts: u32,
    pub liveness_timeout: Duration,
    pub cooldown: Duration,
    pub poll_interval: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            liveness_timeout: Duration::from_secs(10),
            cooldown: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Validated, immutable configuration of a trial.
#[derive(Debug, Clone, PartialEq)]
pub struct PacsConfig {
    pub trial: TrialId,
    pub max_cycle: CycleIndex,
    pub n_replica: ReplicaId,
    pub n_parallel: usize,
    pub working_dir: PathBuf,
    pub simulation: SimulationConfig,
    pub analysis: AnalysisConfig,
    pub export: ExportConfig,
    pub cleanup: CleanupConfig,
    pub launch: LaunchConfig,
}

impl PacsConfig {
    pub fn layout(&self) -> TrialLayout {
        TrialLayout::new(&self.working_dir, self.trial)
    }

    /// Number of replicas per direction in `cycle`; cycle 0 runs a single seed replica.
    pub fn replicas_in(&self, cycle: CycleIndex) -> ReplicaId {
        if cycle == 0 { 1 } else { self.n_replica }
    }

    /// Whether grouped (`-multidir` / groupfile) launches may be used for `cycle`.
    pub fn co_scheduling_enabled(&self, cycle: CycleIndex) -> bool {
        self.simulation.cmd_mpi.is_some() && self.n_parallel > 1 && cycle > 0
    }
}

#[derive(Default)]
pub struct PacsConfigBuilder {
    trial: Option<TrialId>,
    max_cycle: Option<CycleIndex>,
    n_replica: Option<ReplicaId>,
    n_parallel: Option<usize>,
    working_dir: Option<PathBuf>,
    simulator: Option<SimulatorKind>,
    fore: Option<DirectionInputs>,
    back: Option<DirectionInputs>,
    trajectory_extension: Option<String>,
    cmd_mpi: Option<String>,
    cmd_serial: Option<String>,
    cmd_parallel: Option<String>,
    cmd_gmx: Option<String>,
    analyzer_tool: Option<AnalyzerTool>,
    evaluation: Option<EvaluationType>,
    threshold: Option<f64>,
    skip_frame: Option<usize>,
    reference: Option<PathBuf>,
    selections: [Option<String>; 4],
    nojump: bool,
    adaptive: Option<AdaptiveConfig>,
    export_tool: Option<ExportTool>,
    centering: Option<bool>,
    centering_selection: Option<String>,
    cleanup: CleanupConfig,
    launch: LaunchConfig,
}

impl PacsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trial(mut self, trial: TrialId) -> Self {
        self.trial = Some(trial);
        self
    }
    pub fn max_cycle(mut self, max_cycle: CycleIndex) -> Self {
        self.max_cycle = Some(max_cycle);
        self
    }
    pub fn n_replica(mut self, n: ReplicaId) -> Self {
        self.n_replica = Some(n);
        self
    }
    pub fn n_parallel(mut self, n: usize) -> Self {
        self.n_parallel = Some(n);
        self
    }
    pub fn working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
    pub fn simulator(mut self, kind: SimulatorKind) -> Self {
        self.simulator = Some(kind);
        self
    }
    pub fn inputs(mut self, direction: Direction, inputs: DirectionInputs) -> Self {
        match direction {
            Direction::Fore => self.fore = Some(inputs),
            Direction::Back => self.back = Some(inputs),
        }
        self
    }
    pub fn trajectory_extension(mut self, extension: impl Into<String>) -> Self {
        self.trajectory_extension = Some(extension.into());
        self
    }
    pub fn cmd_mpi(mut self, cmd: impl Into<String>) -> Self {
        self.cmd_mpi = Some(cmd.into());
        self
    }
    pub fn cmd_serial(mut self, cmd: impl Into<String>) -> Self {
        self.cmd_serial = Some(cmd.into());
        self
    }
    pub fn cmd_parallel(mut self, cmd: impl Into<String>) -> Self {
        self.cmd_parallel = Some(cmd.into());
        self
    }
    pub fn cmd_gmx(mut self, cmd: impl Into<String>) -> Self {
        self.cmd_gmx = Some(cmd.into());
        self
    }
    pub fn analyzer_tool(mut self, tool: AnalyzerTool) -> Self {
        self.analyzer_tool = Some(tool);
        self
    }
    pub fn evaluation(mut self, evaluation: EvaluationType) -> Self {
        self.evaluation = Some(evaluation);
        self
    }
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
    pub fn skip_frame(mut self, stride: usize) -> Self {
        self.skip_frame = Some(stride);
        self
    }
    pub fn reference(mut self, path: PathBuf) -> Self {
        self.reference = Some(path);
        self
    }
    /// Sets selection `index` (1 to 4).
    pub fn selection(mut self, index: usize, selection: impl Into<String>) -> Self {
        if let Some(slot) = index.checked_sub(1).and_then(|i| self.selections.get_mut(i)) {
            *slot = Some(selection.into());
        }
        self
    }
    pub fn nojump(mut self, enabled: bool) -> Self {
        self.nojump = enabled;
        self
    }
    pub fn adaptive(mut self, adaptive: AdaptiveConfig) -> Self {
        self.adaptive = Some(adaptive);
        self
    }
    pub fn export_tool(mut self, tool: ExportTool) -> Self {
        self.export_tool = Some(tool);
        self
    }
    pub fn centering(mut self, enabled: bool) -> Self {
        self.centering = Some(enabled);
        self
    }
    pub fn centering_selection(mut self, selection: impl Into<String>) -> Self {
        self.centering_selection = Some(selection.into());
        self
    }
    pub fn cleanup(mut self, cleanup: CleanupConfig) -> Self {
        self.cleanup = cleanup;
        self
    }
    pub fn launch(mut self, launch: LaunchConfig) -> Self {
        self.launch = launch;
        self
    }

    pub fn build(self) -> Result<PacsConfig, ConfigError> {
        let trial = self.trial.ok_or(ConfigError::MissingParameter("trial"))?;
        let max_cycle = self
            .max_cycle
            .ok_or(ConfigError::MissingParameter("max_cycle"))?;
        let n_replica = self
            .n_replica
            .ok_or(ConfigError::MissingParameter("n_replica"))?;
        let n_parallel = self.n_parallel.unwrap_or(1);

        check_range("trial", trial, 1)?;
        check_range("max_cycle", max_cycle, 0)?;
        check_range("n_replica", n_replica, 1)?;
        check_range("n_parallel", n_parallel as u32, 1)?;
        if n_parallel > MAX_INDEX as usize {
            return Err(invalid("n_parallel", format!("{} is outside 1..=999", n_parallel)));
        }

        let simulation = Self::build_simulation(
            self.simulator,
            self.fore,
            self.back,
            self.trajectory_extension,
            self.cmd_mpi,
            self.cmd_serial,
            self.cmd_parallel,
            self.cmd_gmx,
        )?;

        let [selection1, selection2, selection3, selection4] = self.selections;
        let analysis = AnalysisConfig {
            tool: self
                .analyzer_tool
                .ok_or(ConfigError::MissingParameter("analyzer"))?,
            evaluation: self.evaluation.ok_or(ConfigError::MissingParameter("type"))?,
            threshold: self.threshold,
            skip_frame: self.skip_frame.unwrap_or(1),
            reference: self.reference,
            selection1,
            selection2,
            selection3,
            selection4,
            nojump: self.nojump,
            adaptive: self.adaptive,
        };
        validate_analysis(&analysis, &simulation)?;

        let export_tool = match self.export_tool {
            Some(tool) => tool,
            None => match simulation.simulator {
                SimulatorKind::Gromacs => ExportTool::Gromacs,
                SimulatorKind::Amber | SimulatorKind::Namd => ExportTool::Cpptraj,
            },
        };
        if export_tool == ExportTool::Gromacs && simulation.simulator != SimulatorKind::Gromacs {
            return Err(invalid(
                "export.tool",
                "the gromacs exporter requires the gromacs simulator",
            ));
        }
        let centering_selection = self
            .centering_selection
            .unwrap_or_else(|| export_tool.default_centering_selection().to_string());
        let export = ExportConfig {
            tool: export_tool,
            centering: self.centering.unwrap_or(true),
            centering_selection,
        };

        if self.launch.max_attempts == 0 {
            return Err(invalid("launch.max_attempts", "must be at least 1"));
        }

        Ok(PacsConfig {
            trial,
            max_cycle,
            n_replica,
            n_parallel,
            working_dir: self.working_dir.unwrap_or_else(|| PathBuf::from(".")),
            simulation,
            analysis,
            export,
            cleanup: self.cleanup,
            launch: self.launch,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_simulation(
        simulator: Option<SimulatorKind>,
        fore: Option<DirectionInputs>,
        back: Option<DirectionInputs>,
        trajectory_extension: Option<String>,
        cmd_mpi: Option<String>,
        cmd_serial: Option<String>,
        cmd_parallel: Option<String>,
        cmd_gmx: Option<String>,
    ) -> Result<SimulationConfig, ConfigError> {
        let simulator = simulator.ok_or(ConfigError::MissingParameter("simulator"))?;
        let fore = fore.ok_or(ConfigError::MissingParameter("simulation.fore"))?;
        let back = back.ok_or(ConfigError::MissingParameter("simulation.back"))?;
        let trajectory_extension = normalize_extension(
            &trajectory_extension.ok_or(ConfigError::MissingParameter("trajectory_extension"))?,
        );

        let fore_ext = structure_extension(&fore.structure)?;
        let back_ext = structure_extension(&back.structure)?;
        if fore_ext != back_ext {
            return Err(invalid(
                "structure",
                format!(
                    "fore and back structures must share an extension ({} vs {})",
                    fore_ext, back_ext
                ),
            ));
        }

        if simulator == SimulatorKind::Gromacs {
            for (name, inputs) in [("simulation.fore", &fore), ("simulation.back", &back)] {
                if inputs.index_file.is_none() {
                    return Err(invalid(name, "an index file is required for gromacs"));
                }
            }
        }

        let cmd_serial = cmd_serial
            .filter(|cmd| !cmd.trim().is_empty())
            .ok_or(ConfigError::MissingParameter("cmd_serial"))?;
        let cmd_parallel = cmd_parallel
            .filter(|cmd| !cmd.trim().is_empty())
            .unwrap_or_else(|| cmd_serial.clone());
        let cmd_mpi = cmd_mpi.filter(|cmd| !cmd.trim().is_empty());
        let cmd_gmx = match (simulator, cmd_gmx) {
            (_, Some(gmx)) => Some(gmx),
            (SimulatorKind::Gromacs, None) => {
                cmd_serial.split_whitespace().next().map(str::to_string)
            }
            _ => None,
        };

        Ok(SimulationConfig {
            simulator,
            fore,
            back,
            trajectory_extension,
            structure_extension: fore_ext,
            cmd_mpi,
            cmd_serial,
            cmd_parallel,
            cmd_gmx,
        })
    }
}

fn validate_analysis(
    analysis: &AnalysisConfig,
    simulation: &SimulationConfig,
) -> Result<(), ConfigError> {
    if analysis.skip_frame == 0 {
        return Err(invalid("skip_frame", "must be at least 1"));
    }
    if analysis.evaluation.requires_threshold() && analysis.threshold.is_none() {
        return Err(ConfigError::MissingParameter("threshold"));
    }
    if analysis.evaluation == EvaluationType::AssociationDissociation
        && analysis.adaptive.is_none()
    {
        return Err(ConfigError::MissingParameter("analysis.adaptive"));
    }
    if analysis.tool == AnalyzerTool::Gromacs && simulation.simulator != SimulatorKind::Gromacs {
        return Err(invalid(
            "analyzer",
            "the gromacs analyzer requires the gromacs simulator",
        ));
    }
    let scripted = matches!(analysis.tool, AnalyzerTool::Script { .. });
    if analysis.evaluation.requires_script() && !scripted {
        return Err(invalid(
            "analyzer",
            format!("{} is only available through a script analyzer", analysis.evaluation),
        ));
    }
    if !scripted {
        if analysis.evaluation.requires_reference() && analysis.reference.is_none() {
            return Err(ConfigError::MissingParameter("reference"));
        }
        if analysis.selection1.is_none() {
            return Err(ConfigError::MissingParameter("selection1"));
        }
        if analysis.selection2.is_none() {
            return Err(ConfigError::MissingParameter("selection2"));
        }
    }
    Ok(())
}

fn check_range(parameter: &'static str, value: u32, min: u32) -> Result<(), ConfigError> {
    if (min..=MAX_INDEX).contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            parameter,
            format!("{} is outside {}..={}", value, min, MAX_INDEX),
        ))
    }
}

fn normalize_extension(extension: &str) -> String {
    let extension = extension.trim();
    if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{}", extension)
    }
}

fn structure_extension(path: &Path) -> Result<String, ConfigError> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .ok_or_else(|| {
            invalid(
                "structure",
                format!("{} has no file extension", path.display()),
            )
        })
}
