use crate::backends::traits::Collaborators;
use crate::core::io::ledger::ProgressLedger;
use crate::core::models::ids::{CycleIndex, Direction, PerDirection, ReplicaId};
use crate::engine::config::PacsConfig;
use crate::engine::cycle::{CycleEngine, CycleOutcome, RankedLists, Termination};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub last_cycle: CycleIndex,
    pub reason: Termination,
    /// Ranked snapshots of the last cycle.
    pub ranked: RankedLists,
}

/// Runs (or resumes) a trial from cycle 0 until a cycle terminates it.
///
/// Cycles already exported by an earlier run are skipped without running anything, so calling
/// this again after an interruption picks up at the first unfinished unit of work.
#[instrument(skip_all, name = "trial_workflow", fields(trial = config.trial))]
pub fn run(
    config: &PacsConfig,
    collaborators: &Collaborators,
    reporter: &ProgressReporter,
) -> Result<TrialResult, EngineError> {
    let engine = CycleEngine::new(config, collaborators, reporter)?;
    let check = engine.verify_version()?;
    info!(
        ?check,
        max_cycle = config.max_cycle,
        n_replica = config.n_replica,
        n_parallel = config.n_parallel,
        "starting trial"
    );

    let mut last = (0, RankedLists::default());
    for cycle in 0..=config.max_cycle {
        reporter.report(Progress::CycleStart {
            cycle,
            max_cycle: config.max_cycle,
        });
        let outcome = engine.run_cycle(cycle)?;
        reporter.report(Progress::CycleFinish { cycle });

        if let CycleOutcome::Terminated { ranked, reason } = outcome {
            info!(cycle, ?reason, "trial finished");
            return Ok(TrialResult {
                last_cycle: cycle,
                reason,
                ranked,
            });
        }
        last = (cycle, outcome.ranked().clone());
    }

    // Only reachable when max_cycle was lowered after its cycle had already been exported.
    let (cycle, ranked) = last;
    warn!(cycle, "last cycle had already been exported by an earlier run");
    Ok(TrialResult {
        last_cycle: cycle,
        reason: Termination::MaxCycle,
        ranked,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionStatus {
    pub finished: usize,
    pub total: ReplicaId,
    pub exported: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleStatus {
    pub cycle: CycleIndex,
    pub directions: PerDirection<DirectionStatus>,
}

impl CycleStatus {
    pub fn is_complete(&self) -> bool {
        self.directions.fore.exported && self.directions.back.exported
    }
}

/// Reads the ledgers of every cycle that has been started, without running anything.
pub fn status(config: &PacsConfig) -> Result<Vec<CycleStatus>, EngineError> {
    let layout = config.layout();
    let mut cycles = Vec::new();
    for cycle in 0..=config.max_cycle {
        if !layout.cycle_dir(cycle).is_dir() {
            break;
        }
        let total = config.replicas_in(cycle);
        let directions = PerDirection::try_from_fn(|direction: Direction| {
            let ledger = ProgressLedger::new(layout.ledger_file(cycle, direction));
            Ok::<_, EngineError>(DirectionStatus {
                finished: ledger.finished_replicas(total)?.len(),
                total,
                exported: ledger.is_complete()?,
            })
        })?;
        cycles.push(CycleStatus { cycle, directions });
    }
    Ok(cycles)
}
