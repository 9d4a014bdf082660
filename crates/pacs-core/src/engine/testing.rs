//! In-process collaborators for engine tests.

use super::config::tests::{gromacs_builder, inputs};
use super::config::{EvaluationType, LaunchConfig, PacsConfig, PacsConfigBuilder};
use super::error::EngineError;
use super::launch::LaunchPlan;
use super::ranking::{Ranker, RankingState};
use crate::backends::exporters::Endpoints;
use crate::backends::traits::{Analyzer, Collaborators, Exporter, Simulator};
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::models::scores::ScoresInOnePair;
use crate::core::models::snapshot::{Cv, Snapshot};
use crate::core::utils::command::ShellCommand;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Rmsd evaluation (descending, converged above 1.0) with 4 replicas, 2 workers and 5 cycles.
pub(crate) fn test_config(
    work: &Path,
    customize: impl FnOnce(PacsConfigBuilder) -> PacsConfigBuilder,
) -> PacsConfig {
    let mut fore = inputs("reactant", true);
    fore.structure = work.join("reactant.gro");
    let mut back = inputs("product", true);
    back.structure = work.join("product.gro");
    let builder = gromacs_builder()
        .inputs(Direction::Fore, fore)
        .inputs(Direction::Back, back)
        .working_dir(work.to_path_buf())
        .evaluation(EvaluationType::Rmsd)
        .threshold(1.0)
        .launch(LaunchConfig {
            max_attempts: 2,
            liveness_timeout: Duration::from_millis(500),
            cooldown: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
        });
    customize(builder).build().unwrap()
}

type Journal = Arc<Mutex<Vec<String>>>;

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Records every planned segment as `"{cycle} {direction} {replicas}"` and runs `true` (or
/// `exit 1` for the failing replica).
#[derive(Clone, Default)]
pub(crate) struct MockSimulator {
    runs: Journal,
    failing: Option<(Direction, ReplicaId)>,
    batches: bool,
    initial_frame: bool,
}

impl MockSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, direction: Direction, replica: ReplicaId) -> Self {
        self.failing = Some((direction, replica));
        self
    }

    pub fn with_batches(mut self) -> Self {
        self.batches = true;
        self
    }

    pub fn with_initial_frame(mut self) -> Self {
        self.initial_frame = true;
        self
    }

    pub fn runs(&self) -> Vec<String> {
        entries(&self.runs)
    }

    fn record(&self, cycle: CycleIndex, direction: Direction, replicas: &[ReplicaId]) {
        let ids = replicas
            .iter()
            .map(ReplicaId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.runs
            .lock()
            .unwrap()
            .push(format!("{} {} {}", cycle, direction, ids));
    }

    fn command(&self, direction: Direction, replicas: &[ReplicaId]) -> ShellCommand {
        let fails = self
            .failing
            .is_some_and(|(d, r)| d == direction && replicas.contains(&r));
        ShellCommand::new(if fails { "exit 1" } else { "true" })
    }
}

impl Simulator for MockSimulator {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn segment_plan(
        &self,
        _config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<LaunchPlan, EngineError> {
        self.record(cycle, direction, &[replica]);
        Ok(LaunchPlan::new(self.command(direction, &[replica])))
    }

    fn batch_plan(
        &self,
        _config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replicas: &[ReplicaId],
    ) -> Result<Option<LaunchPlan>, EngineError> {
        self.record(cycle, direction, replicas);
        Ok(Some(LaunchPlan::new(self.command(direction, replicas))))
    }

    fn supports_batch(&self) -> bool {
        self.batches
    }

    fn includes_initial_frame(&self) -> bool {
        self.initial_frame
    }

    fn cleanup_patterns(&self, _config: &PacsConfig, _cycle: CycleIndex) -> Vec<String> {
        vec!["*.tmp".to_string()]
    }
}

/// Serves canned CV values per (cycle, direction, replica) and ranks with the real [`Ranker`].
#[derive(Clone)]
pub(crate) struct MockAnalyzer {
    values: HashMap<(CycleIndex, Direction, ReplicaId), Vec<f64>>,
    fallback: Vec<f64>,
    pair_frames: Option<usize>,
    ranker: Ranker,
    calls: Journal,
}

impl MockAnalyzer {
    pub fn new(config: &PacsConfig, fallback: Vec<f64>) -> Self {
        Self {
            values: HashMap::new(),
            fallback,
            pair_frames: None,
            ranker: Ranker::from_config(&config.analysis),
            calls: Journal::default(),
        }
    }

    /// Same `values` for both directions of `cycle`, one frame per replica.
    pub fn per_replica(mut self, cycle: CycleIndex, values: &[f64]) -> Self {
        for direction in Direction::ALL {
            for (i, &value) in values.iter().enumerate() {
                self.values
                    .insert((cycle, direction, i as ReplicaId + 1), vec![value]);
            }
        }
        self
    }

    pub fn frames(
        mut self,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
        values: Vec<f64>,
    ) -> Self {
        self.values.insert((cycle, direction, replica), values);
        self
    }

    /// Scores pairs instead of replicas: every pair is a `frames x frames` matrix filled with
    /// `fore_replica + back_replica / 10`.
    pub fn pairwise(mut self, frames: usize) -> Self {
        self.pair_frames = Some(frames);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        entries(&self.calls)
    }
}

impl Analyzer for MockAnalyzer {
    fn score_replica(
        &self,
        _config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<Vec<Cv>, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {} {}", cycle, direction, replica));
        let values = self
            .values
            .get(&(cycle, direction, replica))
            .unwrap_or(&self.fallback);
        Ok(values.iter().copied().map(Cv::Scalar).collect())
    }

    fn score_pair(
        &self,
        _config: &PacsConfig,
        cycle: CycleIndex,
        fore_replica: ReplicaId,
        back_replica: ReplicaId,
    ) -> Result<ScoresInOnePair, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} pair {} {}", cycle, fore_replica, back_replica));
        let frames = self.pair_frames.unwrap_or(1);
        let value = fore_replica as f64 + back_replica as f64 / 10.0;
        let rows = vec![vec![value; frames]; frames];
        Ok(ScoresInOnePair::from_rows(cycle, fore_replica, back_replica, rows)?)
    }

    fn is_pairwise(&self) -> bool {
        self.pair_frames.is_some()
    }

    fn rank(&self, snapshots: Vec<Snapshot>, state: &mut RankingState) -> Vec<Snapshot> {
        self.ranker.rank(snapshots, state)
    }

    fn is_converged(&self, ranked: &[Snapshot]) -> bool {
        self.ranker.meets_threshold(ranked)
    }

    fn initial_state(&self) -> RankingState {
        RankingState::initial(self.ranker.evaluation())
    }
}

/// Writes `"{replica} {frame}"` of the exported snapshot into the next cycle's input file.
#[derive(Clone, Default)]
pub(crate) struct MockExporter {
    exports: Journal,
}

impl MockExporter {
    pub fn exports(&self) -> Vec<String> {
        entries(&self.exports)
    }
}

impl Exporter for MockExporter {
    fn export_snapshot(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        snapshot: &Snapshot,
        target: ReplicaId,
    ) -> Result<(), EngineError> {
        let ends = Endpoints::resolve(config, cycle, direction, snapshot, target);
        std::fs::write(&ends.output, format!("{} {}", snapshot.replica, snapshot.frame))
            .map_err(|e| EngineError::io(&ends.output, e))?;
        self.exports.lock().unwrap().push(format!(
            "{} {} {}->{}",
            cycle, direction, snapshot.replica, target
        ));
        Ok(())
    }
}

pub(crate) fn collaborators(
    simulator: &MockSimulator,
    analyzer: &MockAnalyzer,
    exporter: &MockExporter,
) -> Collaborators {
    Collaborators {
        simulator: Box::new(simulator.clone()),
        analyzer: Box::new(analyzer.clone()),
        exporter: Box::new(exporter.clone()),
    }
}

/// Writes both start structures referenced by [`test_config`].
pub(crate) fn write_start_structures(config: &PacsConfig) {
    for direction in Direction::ALL {
        let path = &config.simulation.inputs(direction).structure;
        std::fs::write(path, direction.as_str()).unwrap();
    }
}
