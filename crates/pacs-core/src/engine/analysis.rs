use super::config::PacsConfig;
use super::error::EngineError;
use super::pool::WorkerPool;
use super::progress::{Progress, ProgressReporter};
use super::ranking::RankingState;
use crate::backends::traits::{Analyzer, Simulator};
use crate::core::io::cv_log::{read_cv_log, write_cv_log};
use crate::core::models::ids::{CycleIndex, Direction, PerDirection, ReplicaId};
use crate::core::models::scores::ScoresInCycle;
use crate::core::models::snapshot::{Cv, Snapshot};
use tracing::{info, warn};

/// Turns the trajectories of a cycle into ranked snapshot lists, one per direction.
///
/// Every artifact is written before the next one is derived from it (`cv.log`, then the
/// ranking state, then `cv_ranked.log`), and an existing `cv_ranked.log` is returned as is, so
/// re-running a finished analysis neither recomputes CVs nor advances the ranking state twice.
pub struct AnalysisStage<'a> {
    config: &'a PacsConfig,
    analyzer: &'a dyn Analyzer,
    simulator: &'a dyn Simulator,
    pool: &'a WorkerPool,
    reporter: &'a ProgressReporter<'a>,
}

impl<'a> AnalysisStage<'a> {
    pub fn new(
        config: &'a PacsConfig,
        analyzer: &'a dyn Analyzer,
        simulator: &'a dyn Simulator,
        pool: &'a WorkerPool,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            config,
            analyzer,
            simulator,
            pool,
            reporter,
        }
    }

    pub fn analyze(&self, cycle: CycleIndex) -> Result<PerDirection<Vec<Snapshot>>, EngineError> {
        if self.analyzer.is_pairwise() {
            self.analyze_pairs(cycle)
        } else {
            PerDirection::try_from_fn(|direction| self.analyze_replicas(cycle, direction))
        }
    }

    /// Ranked lists persisted by an earlier analysis of `cycle`.
    pub fn load_ranked(
        &self,
        cycle: CycleIndex,
    ) -> Result<PerDirection<Vec<Snapshot>>, EngineError> {
        let layout = self.config.layout();
        PerDirection::try_from_fn(|direction| {
            Ok(read_cv_log(&layout.cv_ranked_log(cycle, direction), direction)?)
        })
    }

    fn analyze_replicas(
        &self,
        cycle: CycleIndex,
        direction: Direction,
    ) -> Result<Vec<Snapshot>, EngineError> {
        let ranked_path = self.config.layout().cv_ranked_log(cycle, direction);
        if ranked_path.exists() {
            info!(cycle, %direction, "reusing ranked CVs");
            return Ok(read_cv_log(&ranked_path, direction)?);
        }

        let replicas: Vec<ReplicaId> = (1..=self.config.replicas_in(cycle)).collect();
        self.reporter.report(Progress::TaskStart {
            total_steps: replicas.len() as u64,
        });
        let results = self.pool.fan_out(
            &replicas,
            |replica| format!("CV of cycle {} {} replica {}", cycle, direction, replica),
            |&replica| {
                let cvs = self
                    .analyzer
                    .score_replica(self.config, cycle, direction, replica);
                self.reporter.report(Progress::TaskIncrement);
                cvs
            },
        );
        self.reporter.report(Progress::TaskFinish);

        let skip_initial = self.simulator.includes_initial_frame();
        let mut snapshots = Vec::new();
        for (&replica, cvs) in replicas.iter().zip(results) {
            let cvs = cvs?;
            if cvs.is_empty() {
                warn!(cycle, %direction, replica, "analysis returned no frames");
            }
            snapshots.extend(
                cvs.into_iter()
                    .enumerate()
                    .skip(usize::from(skip_initial))
                    .map(|(frame, cv)| Snapshot::new(direction, replica, frame, cv)),
            );
        }
        self.finish(cycle, direction, snapshots)
    }

    fn analyze_pairs(&self, cycle: CycleIndex) -> Result<PerDirection<Vec<Snapshot>>, EngineError> {
        let layout = self.config.layout();
        let mut scores: Option<ScoresInCycle> = None;
        PerDirection::try_from_fn(|direction| {
            let ranked_path = layout.cv_ranked_log(cycle, direction);
            if ranked_path.exists() {
                info!(cycle, %direction, "reusing ranked CVs");
                return Ok(read_cv_log(&ranked_path, direction)?);
            }
            let tensor = match scores.take() {
                Some(tensor) => tensor,
                None => self.pair_scores(cycle)?,
            };

            let skip_initial = self.simulator.includes_initial_frame();
            let snapshots = tensor
                .aggregate(direction, skip_initial)
                .into_iter()
                .enumerate()
                .flat_map(|(index, frames)| {
                    let replica = index as ReplicaId + 1;
                    frames.into_iter().map(move |(frame, value)| {
                        Snapshot::new(direction, replica, frame, Cv::Scalar(value))
                    })
                })
                .collect();
            scores = Some(tensor);
            self.finish(cycle, direction, snapshots)
        })
    }

    /// Loads the score tensor of `cycle`, computing and persisting it first if needed.
    fn pair_scores(&self, cycle: CycleIndex) -> Result<ScoresInCycle, EngineError> {
        let path = self.config.layout().scores_file(cycle);
        if path.exists() {
            info!(cycle, path = %path.display(), "reusing pairwise scores");
            return Ok(ScoresInCycle::load_npy(&path, cycle)?);
        }

        let n = self.config.replicas_in(cycle);
        // The first pair fixes the frame counts every other pair must match.
        let first = self.analyzer.score_pair(self.config, cycle, 1, 1)?;
        let (frames_fore, frames_back) = first.shape();
        let mut scores = ScoresInCycle::new(cycle, n as usize, frames_fore, frames_back);
        scores.add(&first)?;

        let pairs: Vec<(ReplicaId, ReplicaId)> = (1..=n)
            .flat_map(|fore| (1..=n).map(move |back| (fore, back)))
            .filter(|&pair| pair != (1, 1))
            .collect();
        self.reporter.report(Progress::TaskStart {
            total_steps: pairs.len() as u64,
        });
        let results = self.pool.fan_out(
            &pairs,
            |(fore, back)| format!("scores of cycle {} pair ({}, {})", cycle, fore, back),
            |&(fore, back)| {
                let pair = self.analyzer.score_pair(self.config, cycle, fore, back);
                self.reporter.report(Progress::TaskIncrement);
                pair
            },
        );
        self.reporter.report(Progress::TaskFinish);
        for pair in results {
            scores.add(&pair?)?;
        }

        scores.save_npy(&path)?;
        info!(cycle, pairs = pairs.len() + 1, "pairwise scores saved");
        Ok(scores)
    }

    fn finish(
        &self,
        cycle: CycleIndex,
        direction: Direction,
        snapshots: Vec<Snapshot>,
    ) -> Result<Vec<Snapshot>, EngineError> {
        let layout = self.config.layout();
        write_cv_log(&layout.cv_log(cycle, direction), &snapshots)?;

        // Every `skip_frame`-th entry of the concatenated list, counted after the initial frame
        // was dropped.
        let stride = self.config.analysis.skip_frame;
        let sampled: Vec<Snapshot> = snapshots.into_iter().step_by(stride).collect();

        let mut state = self.ranking_state(cycle, direction)?;
        let ranked = self.analyzer.rank(sampled, &mut state);
        state.save(&layout.ranking_state_file(cycle, direction))?;
        write_cv_log(&layout.cv_ranked_log(cycle, direction), &ranked)?;

        if let Some(best) = ranked.first() {
            info!(cycle, %direction, best = %best, "ranked {} snapshot(s)", ranked.len());
        }
        Ok(ranked)
    }

    /// Sort state left by the previous cycle of the same direction.
    fn ranking_state(
        &self,
        cycle: CycleIndex,
        direction: Direction,
    ) -> Result<RankingState, EngineError> {
        if cycle == 0 {
            return Ok(self.analyzer.initial_state());
        }
        let path = self.config.layout().ranking_state_file(cycle - 1, direction);
        match RankingState::load(&path)? {
            Some(state) => Ok(state),
            None => {
                warn!(
                    path = %path.display(),
                    "no ranking state from the previous cycle, starting fresh"
                );
                Ok(self.analyzer.initial_state())
            }
        }
    }
}
