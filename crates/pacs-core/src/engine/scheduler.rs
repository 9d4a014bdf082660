use super::config::PacsConfig;
use super::error::EngineError;
use super::launch;
use super::pool::WorkerPool;
use super::progress::{Progress, ProgressReporter};
use crate::backends::traits::Simulator;
use crate::core::io::ledger::ProgressLedger;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use tracing::{debug, info};

/// Runs the MD segments of one direction of one cycle, resuming from its ledger.
///
/// A replica counts as finished only once the ledger says so; trajectory files left behind by
/// an interrupted run are ignored and the segment is run again.
pub struct ReplicaScheduler<'a> {
    config: &'a PacsConfig,
    simulator: &'a dyn Simulator,
    pool: &'a WorkerPool,
    reporter: &'a ProgressReporter<'a>,
}

impl<'a> ReplicaScheduler<'a> {
    pub fn new(
        config: &'a PacsConfig,
        simulator: &'a dyn Simulator,
        pool: &'a WorkerPool,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            config,
            simulator,
            pool,
            reporter,
        }
    }

    /// Runs every replica of (`cycle`, `direction`) the ledger does not list as done and
    /// returns the replicas that were run.
    pub fn run_direction(
        &self,
        cycle: CycleIndex,
        direction: Direction,
    ) -> Result<Vec<ReplicaId>, EngineError> {
        let ledger = ProgressLedger::new(self.config.layout().ledger_file(cycle, direction));
        let pending = ledger.pending_replicas(self.config.replicas_in(cycle))?;
        if pending.is_empty() {
            info!(cycle, %direction, "all segments already finished");
            return Ok(pending);
        }
        info!(cycle, %direction, pending = pending.len(), "running segments");

        self.reporter.report(Progress::TaskStart {
            total_steps: pending.len() as u64,
        });
        let record = |replica: ReplicaId| -> Result<(), EngineError> {
            ledger.append_replica_done(replica)?;
            self.reporter.report(Progress::TaskIncrement);
            Ok(())
        };

        let grouped = self.config.co_scheduling_enabled(cycle) && self.simulator.supports_batch();
        if grouped {
            for batch in pending.chunks(self.pool.width()) {
                if batch.len() == self.pool.width() {
                    self.run_batch(cycle, direction, batch)?;
                    batch.iter().try_for_each(|&replica| record(replica))?;
                } else {
                    // A short batch would leave launcher slots idle; run it replica by replica.
                    for &replica in batch {
                        self.run_segment(cycle, direction, replica)?;
                        record(replica)?;
                    }
                }
            }
        } else {
            self.pool.run_batches(
                &pending,
                |replica| format!("cycle {} {} replica {}", cycle, direction, replica),
                |&replica| self.run_segment(cycle, direction, replica),
                |batch| batch.iter().try_for_each(|&replica| record(replica)),
            )?;
        }

        self.reporter.report(Progress::TaskFinish);
        Ok(pending)
    }

    /// Runs one replica's segment to completion.
    pub fn run_segment(
        &self,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<(), EngineError> {
        debug!(cycle, %direction, replica, "segment");
        let plan = self
            .simulator
            .segment_plan(self.config, cycle, direction, replica)?;
        launch::execute(&plan, &self.config.launch)
    }

    /// Runs `replicas` as one grouped job, falling back to sequential segments when the
    /// simulator has no grouped form for them.
    pub fn run_batch(
        &self,
        cycle: CycleIndex,
        direction: Direction,
        replicas: &[ReplicaId],
    ) -> Result<(), EngineError> {
        match self
            .simulator
            .batch_plan(self.config, cycle, direction, replicas)?
        {
            Some(plan) => {
                debug!(cycle, %direction, ?replicas, "grouped segments");
                launch::execute(&plan, &self.config.launch)
            }
            None => replicas
                .iter()
                .try_for_each(|&replica| self.run_segment(cycle, direction, replica)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{MockSimulator, test_config};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn finished(
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
    ) -> BTreeSet<ReplicaId> {
        ProgressLedger::new(config.layout().ledger_file(cycle, direction))
            .finished_replicas(config.replicas_in(cycle))
            .unwrap()
    }

    mod resume {
        use super::*;

        #[test]
        fn only_unfinished_replicas_run() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| b);
            config.layout().create_cycle_tree(1, 4).unwrap();
            let ledger = ProgressLedger::new(config.layout().ledger_file(1, Direction::Fore));
            for replica in 1..=3 {
                ledger.append_replica_done(replica).unwrap();
            }

            let simulator = MockSimulator::new();
            let pool = WorkerPool::new(config.n_parallel).unwrap();
            let reporter = ProgressReporter::new();
            let scheduler = ReplicaScheduler::new(&config, &simulator, &pool, &reporter);

            assert_eq!(scheduler.run_direction(1, Direction::Fore).unwrap(), vec![4]);
            assert_eq!(simulator.runs(), vec!["1 fore 4".to_string()]);
            assert_eq!(finished(&config, 1, Direction::Fore), (1..=4).collect());

            assert!(scheduler.run_direction(1, Direction::Fore).unwrap().is_empty());
            assert_eq!(simulator.runs().len(), 1);
        }

        #[test]
        fn cycle_zero_runs_a_single_replica() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| b);
            config.layout().create_cycle_tree(0, 1).unwrap();
            let simulator = MockSimulator::new();
            let pool = WorkerPool::new(config.n_parallel).unwrap();
            let reporter = ProgressReporter::new();

            let ran = ReplicaScheduler::new(&config, &simulator, &pool, &reporter)
                .run_direction(0, Direction::Back)
                .unwrap();
            assert_eq!(ran, vec![1]);
        }
    }

    mod batches {
        use super::*;

        #[test]
        fn failed_batch_leaves_earlier_batches_recorded() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| b.n_parallel(2));
            config.layout().create_cycle_tree(1, 4).unwrap();
            let simulator = MockSimulator::new().failing(Direction::Fore, 3);
            let pool = WorkerPool::new(config.n_parallel).unwrap();
            let reporter = ProgressReporter::new();

            let err = ReplicaScheduler::new(&config, &simulator, &pool, &reporter)
                .run_direction(1, Direction::Fore)
                .unwrap_err();

            assert!(matches!(err, EngineError::ExternalCommand { .. }));
            assert_eq!(finished(&config, 1, Direction::Fore), BTreeSet::from([1, 2]));
        }

        #[test]
        fn full_batches_are_grouped_and_the_remainder_runs_alone() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| {
                b.n_replica(5).n_parallel(2).cmd_mpi("mpirun -np 2")
            });
            config.layout().create_cycle_tree(1, 5).unwrap();
            let simulator = MockSimulator::new().with_batches();
            let pool = WorkerPool::new(config.n_parallel).unwrap();
            let reporter = ProgressReporter::new();

            ReplicaScheduler::new(&config, &simulator, &pool, &reporter)
                .run_direction(1, Direction::Back)
                .unwrap();

            assert_eq!(
                simulator.runs(),
                vec![
                    "1 back 1,2".to_string(),
                    "1 back 3,4".to_string(),
                    "1 back 5".to_string()
                ]
            );
            assert_eq!(finished(&config, 1, Direction::Back), (1..=5).collect());
        }

        #[test]
        fn grouping_is_not_used_without_a_launcher() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| b.n_parallel(2));
            config.layout().create_cycle_tree(1, 4).unwrap();
            let simulator = MockSimulator::new().with_batches();
            let pool = WorkerPool::new(config.n_parallel).unwrap();
            let reporter = ProgressReporter::new();

            ReplicaScheduler::new(&config, &simulator, &pool, &reporter)
                .run_direction(1, Direction::Fore)
                .unwrap();

            let mut runs = simulator.runs();
            runs.sort();
            assert_eq!(runs, vec!["1 fore 1", "1 fore 2", "1 fore 3", "1 fore 4"]);
        }
    }
}
