use crate::core::models::ids::{CycleIndex, Direction, ReplicaId, TrialId};
use std::io;
use std::path::{Path, PathBuf};

/// Resolves every path of a trial's directory tree.
///
/// ```text
/// {working_dir}/trial{NNN}.log
/// {working_dir}/trial{NNN}/pacs.version
/// {working_dir}/trial{NNN}/cycle{NNN}/summary/scores.npy
/// {working_dir}/trial{NNN}/cycle{NNN}/{fore,back}/summary/{progress.log,cv.log,cv_ranked.log,ranking.toml}
/// {working_dir}/trial{NNN}/cycle{NNN}/{fore,back}/replica{NNN}/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialLayout {
    working_dir: PathBuf,
    trial: TrialId,
}

impl TrialLayout {
    pub fn new(working_dir: impl Into<PathBuf>, trial: TrialId) -> Self {
        Self {
            working_dir: working_dir.into(),
            trial,
        }
    }

    pub fn trial(&self) -> TrialId {
        self.trial
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn trial_dir(&self) -> PathBuf {
        self.working_dir.join(format!("trial{:03}", self.trial))
    }

    pub fn run_log(&self) -> PathBuf {
        self.working_dir.join(format!("trial{:03}.log", self.trial))
    }

    pub fn version_file(&self) -> PathBuf {
        self.trial_dir().join("pacs.version")
    }

    pub fn cycle_dir(&self, cycle: CycleIndex) -> PathBuf {
        self.trial_dir().join(format!("cycle{:03}", cycle))
    }

    pub fn cycle_summary_dir(&self, cycle: CycleIndex) -> PathBuf {
        self.cycle_dir(cycle).join("summary")
    }

    pub fn scores_file(&self, cycle: CycleIndex) -> PathBuf {
        self.cycle_summary_dir(cycle).join("scores.npy")
    }

    pub fn direction_dir(&self, cycle: CycleIndex, direction: Direction) -> PathBuf {
        self.cycle_dir(cycle).join(direction.as_str())
    }

    pub fn summary_dir(&self, cycle: CycleIndex, direction: Direction) -> PathBuf {
        self.direction_dir(cycle, direction).join("summary")
    }

    pub fn ledger_file(&self, cycle: CycleIndex, direction: Direction) -> PathBuf {
        self.summary_dir(cycle, direction).join("progress.log")
    }

    pub fn cv_log(&self, cycle: CycleIndex, direction: Direction) -> PathBuf {
        self.summary_dir(cycle, direction).join("cv.log")
    }

    pub fn cv_ranked_log(&self, cycle: CycleIndex, direction: Direction) -> PathBuf {
        self.summary_dir(cycle, direction).join("cv_ranked.log")
    }

    pub fn ranking_state_file(&self, cycle: CycleIndex, direction: Direction) -> PathBuf {
        self.summary_dir(cycle, direction).join("ranking.toml")
    }

    pub fn replica_dir(
        &self,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> PathBuf {
        self.direction_dir(cycle, direction)
            .join(format!("replica{:03}", replica))
    }

    /// Frame-index to simulation-time table shared by every cycle of the trial.
    pub fn frame_time_file(&self) -> PathBuf {
        self.replica_dir(0, Direction::Fore, 1).join("frame_time.tsv")
    }

    /// Creates the summary directories and `n_replica` replica directories for both directions.
    pub fn create_cycle_tree(&self, cycle: CycleIndex, n_replica: ReplicaId) -> io::Result<()> {
        std::fs::create_dir_all(self.cycle_summary_dir(cycle))?;
        for direction in Direction::ALL {
            std::fs::create_dir_all(self.summary_dir(cycle, direction))?;
            for replica in 1..=n_replica {
                std::fs::create_dir_all(self.replica_dir(cycle, direction, replica))?;
            }
        }
        Ok(())
    }
}
