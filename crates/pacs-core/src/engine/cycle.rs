use super::analysis::AnalysisStage;
use super::cleanup;
use super::config::PacsConfig;
use super::error::EngineError;
use super::export::export_next_generation;
use super::pool::WorkerPool;
use super::progress::{Progress, ProgressReporter};
use super::scheduler::ReplicaScheduler;
use crate::backends::traits::Collaborators;
use crate::core::io::ledger::ProgressLedger;
use crate::core::io::version::{PACS_VERSION, VersionCheck, verify_or_stamp};
use crate::core::models::ids::{CycleIndex, Direction, PerDirection};
use crate::core::models::snapshot::Snapshot;
use tracing::{debug, info};

pub type RankedLists = PerDirection<Vec<Snapshot>>;

/// Why a trial stopped after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The best snapshot of `direction` passed the threshold.
    Threshold { direction: Direction },
    MaxCycle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The next cycle was seeded.
    Continue { ranked: RankedLists },
    /// The trial ends with this cycle.
    Terminated { ranked: RankedLists, reason: Termination },
    /// The cycle had already been exported by an earlier run; nothing was executed.
    Skipped { ranked: RankedLists },
}

impl CycleOutcome {
    pub fn ranked(&self) -> &RankedLists {
        match self {
            CycleOutcome::Continue { ranked }
            | CycleOutcome::Terminated { ranked, .. }
            | CycleOutcome::Skipped { ranked } => ranked,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleOutcome::Terminated { .. })
    }
}

#[derive(Debug)]
enum CycleState {
    Init,
    SegmentRun,
    Analyze,
    Decide(RankedLists),
    Export(RankedLists),
    Terminate(RankedLists, Termination),
    Done(CycleOutcome),
}

impl CycleState {
    fn name(&self) -> &'static str {
        match self {
            CycleState::Init => "init",
            CycleState::SegmentRun => "segment-run",
            CycleState::Analyze => "analyze",
            CycleState::Decide(_) => "decide",
            CycleState::Export(_) => "export",
            CycleState::Terminate(..) => "terminate",
            CycleState::Done(_) => "done",
        }
    }
}

/// Drives one cycle through `Init → SegmentRun → Analyze → Decide → Export | Terminate`.
pub struct CycleEngine<'a> {
    config: &'a PacsConfig,
    collaborators: &'a Collaborators,
    pool: WorkerPool,
    reporter: &'a ProgressReporter<'a>,
}

impl<'a> CycleEngine<'a> {
    pub fn new(
        config: &'a PacsConfig,
        collaborators: &'a Collaborators,
        reporter: &'a ProgressReporter<'a>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            config,
            collaborators,
            pool: WorkerPool::new(config.n_parallel)?,
            reporter,
        })
    }

    /// A cycle is complete once both directions recorded their export marker.
    pub fn is_complete(&self, cycle: CycleIndex) -> Result<bool, EngineError> {
        let layout = self.config.layout();
        for direction in Direction::ALL {
            if !ProgressLedger::new(layout.ledger_file(cycle, direction)).is_complete()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Checks the version stamp of the trial directory, writing it on first use.
    pub fn verify_version(&self) -> Result<VersionCheck, EngineError> {
        let path = self.config.layout().version_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        Ok(verify_or_stamp(&path, PACS_VERSION)?)
    }

    pub fn run_cycle(&self, cycle: CycleIndex) -> Result<CycleOutcome, EngineError> {
        if self.is_complete(cycle)? {
            info!(cycle, "cycle already exported, skipping");
            let ranked = self.analysis().load_ranked(cycle)?;
            return Ok(CycleOutcome::Skipped { ranked });
        }

        let mut state = if cycle == 0 {
            CycleState::Init
        } else {
            CycleState::SegmentRun
        };
        loop {
            debug!(cycle, state = state.name(), "entering state");
            state = match state {
                CycleState::Init => {
                    self.initialize()?;
                    CycleState::SegmentRun
                }
                CycleState::SegmentRun => {
                    self.phase("Running segments", || {
                        let scheduler = ReplicaScheduler::new(
                            self.config,
                            self.collaborators.simulator.as_ref(),
                            &self.pool,
                            self.reporter,
                        );
                        for direction in Direction::ALL {
                            scheduler.run_direction(cycle, direction)?;
                        }
                        Ok(())
                    })?;
                    CycleState::Analyze
                }
                CycleState::Analyze => {
                    let ranked = self.phase("Analyzing", || self.analysis().analyze(cycle))?;
                    CycleState::Decide(ranked)
                }
                CycleState::Decide(ranked) => match self.decide(cycle, &ranked) {
                    Some(reason) => CycleState::Terminate(ranked, reason),
                    None => CycleState::Export(ranked),
                },
                CycleState::Export(ranked) => {
                    self.phase("Exporting", || self.export(cycle, &ranked))?;
                    self.cleanup(cycle)?;
                    CycleState::Done(CycleOutcome::Continue { ranked })
                }
                CycleState::Terminate(ranked, reason) => {
                    info!(cycle, ?reason, "trial terminates");
                    self.cleanup(cycle)?;
                    CycleState::Done(CycleOutcome::Terminated { ranked, reason })
                }
                CycleState::Done(outcome) => return Ok(outcome),
            };
        }
    }

    fn analysis(&self) -> AnalysisStage<'_> {
        AnalysisStage::new(
            self.config,
            self.collaborators.analyzer.as_ref(),
            self.collaborators.simulator.as_ref(),
            &self.pool,
            self.reporter,
        )
    }

    fn phase<T>(
        &self,
        name: &str,
        body: impl FnOnce() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.reporter.phase(name);
        let result = body();
        self.reporter.report(Progress::PhaseFinish);
        result
    }

    /// Creates the cycle-0 tree and copies both start structures into it.
    fn initialize(&self) -> Result<(), EngineError> {
        let layout = self.config.layout();
        layout
            .create_cycle_tree(0, 1)
            .map_err(|e| EngineError::io(layout.cycle_dir(0), e))?;
        for direction in Direction::ALL {
            let source = &self.config.simulation.inputs(direction).structure;
            let target = layout
                .replica_dir(0, direction, 1)
                .join(format!("input{}", self.config.simulation.structure_extension));
            std::fs::copy(source, &target).map_err(|e| EngineError::io(source, e))?;
        }
        let check = self.verify_version()?;
        info!(?check, version = PACS_VERSION, "trial initialized");
        Ok(())
    }

    fn decide(&self, cycle: CycleIndex, ranked: &RankedLists) -> Option<Termination> {
        let analyzer = self.collaborators.analyzer.as_ref();
        let converged = Direction::ALL
            .into_iter()
            .find(|&direction| analyzer.is_converged(ranked.get(direction)));
        match converged {
            Some(direction) => Some(Termination::Threshold { direction }),
            None if cycle >= self.config.max_cycle => Some(Termination::MaxCycle),
            None => None,
        }
    }

    fn export(&self, cycle: CycleIndex, ranked: &RankedLists) -> Result<(), EngineError> {
        let exporter = self.collaborators.exporter.as_ref();
        exporter.prepare(self.config, cycle)?;
        let layout = self.config.layout();
        for (direction, list) in ranked.iter() {
            if ProgressLedger::new(layout.ledger_file(cycle, direction)).is_complete()? {
                debug!(cycle, %direction, "direction already exported");
                continue;
            }
            export_next_generation(self.config, exporter, &self.pool, cycle, direction, list)?;
        }
        Ok(())
    }

    fn cleanup(&self, cycle: CycleIndex) -> Result<(), EngineError> {
        cleanup::reduce_trajectories(self.config, &self.pool, cycle)?;
        cleanup::remove_intermediates(self.config, self.collaborators.simulator.as_ref(), cycle)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::ledger::LedgerEntry;
    use crate::engine::testing::{
        MockAnalyzer, MockExporter, MockSimulator, collaborators, test_config,
        write_start_structures,
    };
    use tempfile::tempdir;

    struct Harness {
        config: PacsConfig,
        simulator: MockSimulator,
        analyzer: MockAnalyzer,
        exporter: MockExporter,
    }

    impl Harness {
        fn run(&self, cycle: CycleIndex) -> Result<CycleOutcome, EngineError> {
            let collaborators = collaborators(&self.simulator, &self.analyzer, &self.exporter);
            let reporter = ProgressReporter::new();
            CycleEngine::new(&self.config, &collaborators, &reporter)?.run_cycle(cycle)
        }

        fn last_entry(&self, cycle: CycleIndex, direction: Direction) -> Option<LedgerEntry> {
            ProgressLedger::new(self.config.layout().ledger_file(cycle, direction))
                .last_entry()
                .unwrap()
        }
    }

    /// Cycle 1 of a 4-replica trial whose tree already exists.
    fn cycle_one(work: &std::path::Path, threshold: f64) -> Harness {
        let config = test_config(work, |b| b.threshold(threshold));
        config.layout().create_cycle_tree(1, 4).unwrap();
        let analyzer = MockAnalyzer::new(&config, vec![]).per_replica(1, &[0.9, 0.3, 1.2, 0.5]);
        Harness {
            config,
            simulator: MockSimulator::new(),
            analyzer,
            exporter: MockExporter::default(),
        }
    }

    mod scenarios {
        use super::*;

        #[test]
        fn best_above_threshold_terminates_after_cycle_one() {
            let work = tempdir().unwrap();
            let harness = cycle_one(work.path(), 1.0);

            let outcome = harness.run(1).unwrap();

            assert_eq!(
                outcome,
                CycleOutcome::Terminated {
                    ranked: outcome.ranked().clone(),
                    reason: Termination::Threshold {
                        direction: Direction::Fore
                    },
                }
            );
            assert_eq!(outcome.ranked().fore[0].replica, 3);
            assert!(harness.exporter.exports().is_empty());
            assert_eq!(
                harness.last_entry(1, Direction::Fore),
                Some(LedgerEntry::ReplicaDone(4))
            );
        }

        #[test]
        fn unconverged_cycle_seeds_the_next_from_the_ranking() {
            let work = tempdir().unwrap();
            let harness = cycle_one(work.path(), 2.0);

            let outcome = harness.run(1).unwrap();

            assert!(matches!(outcome, CycleOutcome::Continue { .. }));
            assert_eq!(harness.exporter.exports().len(), 8);
            for direction in Direction::ALL {
                let seed = harness
                    .config
                    .layout()
                    .replica_dir(2, direction, 1)
                    .join("input.gro");
                assert_eq!(std::fs::read_to_string(seed).unwrap(), "3 0");
                assert_eq!(
                    harness.last_entry(1, direction),
                    Some(LedgerEntry::ExportCompleted { next_cycle: 2 })
                );
            }
        }

        #[test]
        fn partially_recorded_cycle_only_runs_the_rest() {
            let work = tempdir().unwrap();
            let harness = cycle_one(work.path(), 2.0);
            for direction in Direction::ALL {
                let ledger = ProgressLedger::new(harness.config.layout().ledger_file(1, direction));
                for replica in 1..=3 {
                    ledger.append_replica_done(replica).unwrap();
                }
            }

            harness.run(1).unwrap();

            assert_eq!(harness.simulator.runs(), vec!["1 fore 4", "1 back 4"]);
            assert_eq!(harness.analyzer.calls().len(), 8);
            assert_eq!(harness.exporter.exports().len(), 8);
        }
    }

    mod resume {
        use super::*;

        #[test]
        fn exported_cycle_is_skipped_with_its_ranking() {
            let work = tempdir().unwrap();
            let harness = cycle_one(work.path(), 2.0);
            let first = harness.run(1).unwrap();
            let runs = harness.simulator.runs().len();

            let second = harness.run(1).unwrap();

            assert_eq!(
                second,
                CycleOutcome::Skipped {
                    ranked: first.ranked().clone()
                }
            );
            assert_eq!(harness.simulator.runs().len(), runs);
            assert_eq!(harness.exporter.exports().len(), 8);
        }

        #[test]
        fn interrupted_export_finishes_the_missing_direction() {
            let work = tempdir().unwrap();
            let harness = cycle_one(work.path(), 2.0);
            harness.run(1).unwrap();
            // Pretend the back export never finished.
            let ledger_path = harness.config.layout().ledger_file(1, Direction::Back);
            let text = std::fs::read_to_string(&ledger_path).unwrap();
            let kept: Vec<&str> = text.lines().filter(|l| !l.contains("export")).collect();
            std::fs::write(&ledger_path, kept.join("\n") + "\n").unwrap();

            let outcome = harness.run(1).unwrap();

            assert!(matches!(outcome, CycleOutcome::Continue { .. }));
            assert_eq!(harness.exporter.exports().len(), 12);
            assert!(harness.exporter.exports()[8..]
                .iter()
                .all(|e| e.starts_with("1 back")));
            assert_eq!(harness.analyzer.calls().len(), 8);
        }
    }

    mod termination {
        use super::*;

        #[test]
        fn last_cycle_always_terminates() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| b.max_cycle(1).threshold(5.0));
            config.layout().create_cycle_tree(1, 4).unwrap();
            let harness = Harness {
                analyzer: MockAnalyzer::new(&config, vec![0.1]),
                config,
                simulator: MockSimulator::new(),
                exporter: MockExporter::default(),
            };

            let outcome = harness.run(1).unwrap();

            assert!(matches!(
                outcome,
                CycleOutcome::Terminated {
                    reason: Termination::MaxCycle,
                    ..
                }
            ));
            assert!(harness.exporter.exports().is_empty());
        }

        #[test]
        fn cycle_zero_copies_inputs_and_stamps_the_version() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| b);
            write_start_structures(&config);
            let harness = Harness {
                analyzer: MockAnalyzer::new(&config, vec![0.1, 0.2, 0.3, 0.4, 0.5]),
                config,
                simulator: MockSimulator::new(),
                exporter: MockExporter::default(),
            };

            let outcome = harness.run(0).unwrap();

            let layout = harness.config.layout();
            assert!(matches!(outcome, CycleOutcome::Continue { .. }));
            assert_eq!(
                std::fs::read_to_string(
                    layout.replica_dir(0, Direction::Back, 1).join("input.gro")
                )
                .unwrap(),
                "back"
            );
            assert_eq!(
                std::fs::read_to_string(layout.version_file()).unwrap().trim(),
                PACS_VERSION
            );
            assert_eq!(harness.simulator.runs(), vec!["0 fore 1", "0 back 1"]);
            // Best four frames of the single seed replica, highest first.
            assert_eq!(
                std::fs::read_to_string(
                    layout.replica_dir(1, Direction::Fore, 1).join("input.gro")
                )
                .unwrap(),
                "1 4"
            );
        }

        #[test]
        fn cycle_zero_with_too_few_frames_cannot_seed() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| b);
            write_start_structures(&config);
            let harness = Harness {
                analyzer: MockAnalyzer::new(&config, vec![0.1, 0.2]),
                config,
                simulator: MockSimulator::new(),
                exporter: MockExporter::default(),
            };

            let err = harness.run(0).unwrap_err();
            assert!(matches!(err, EngineError::InsufficientMaterial { .. }));
        }
    }
}
