use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::models::scores::ScoresInOnePair;
use crate::core::models::snapshot::{Cv, Snapshot};
use crate::engine::config::PacsConfig;
use crate::engine::error::EngineError;
use crate::engine::launch::LaunchPlan;
use crate::engine::ranking::RankingState;

/// Builds the command lines of an MD engine.
///
/// Implementations never launch processes themselves; they describe what to run as a
/// [`LaunchPlan`] and leave execution and retries to the scheduler.
pub trait Simulator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Plan for one segment of `replica` in (`cycle`, `direction`).
    fn segment_plan(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<LaunchPlan, EngineError>;

    /// Plan running all `replicas` as one grouped job, if the engine can do that.
    fn batch_plan(
        &self,
        _config: &PacsConfig,
        _cycle: CycleIndex,
        _direction: Direction,
        _replicas: &[ReplicaId],
    ) -> Result<Option<LaunchPlan>, EngineError> {
        Ok(None)
    }

    fn supports_batch(&self) -> bool {
        false
    }

    /// Whether frame 0 of every trajectory is the starting structure rather than sampled data.
    fn includes_initial_frame(&self) -> bool {
        false
    }

    /// Glob patterns (relative to a replica directory) of intermediate files safe to delete
    /// once `cycle` is finished.
    fn cleanup_patterns(&self, _config: &PacsConfig, _cycle: CycleIndex) -> Vec<String> {
        Vec::new()
    }
}

/// Computes, orders and judges collective-variable values.
pub trait Analyzer: Send + Sync {
    /// CV value of every frame of one replica's trajectory, in frame order.
    fn score_replica(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<Vec<Cv>, EngineError>;

    /// CV matrix between every frame of `fore_replica` and every frame of `back_replica`.
    fn score_pair(
        &self,
        _config: &PacsConfig,
        cycle: CycleIndex,
        fore_replica: ReplicaId,
        back_replica: ReplicaId,
    ) -> Result<ScoresInOnePair, EngineError> {
        Err(EngineError::Unsupported(format!(
            "pairwise scoring of cycle {} pair ({}, {})",
            cycle, fore_replica, back_replica
        )))
    }

    /// Whether scores come from [`Analyzer::score_pair`] instead of [`Analyzer::score_replica`].
    fn is_pairwise(&self) -> bool {
        false
    }

    fn rank(&self, snapshots: Vec<Snapshot>, state: &mut RankingState) -> Vec<Snapshot>;

    fn is_converged(&self, ranked: &[Snapshot]) -> bool;

    /// Sort state for the first cycle of a trial.
    fn initial_state(&self) -> RankingState;
}

/// Extracts a ranked snapshot as the starting structure of a next-cycle replica.
pub trait Exporter: Send + Sync {
    /// One-time preparation before the snapshots of `cycle` are exported.
    fn prepare(&self, _config: &PacsConfig, _cycle: CycleIndex) -> Result<(), EngineError> {
        Ok(())
    }

    /// Writes `snapshot` to `replica{target}/input{ext}` of (`cycle + 1`, `direction`).
    fn export_snapshot(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        snapshot: &Snapshot,
        target: ReplicaId,
    ) -> Result<(), EngineError>;
}

/// The three collaborators a trial runs with, chosen once from the configuration.
pub struct Collaborators {
    pub simulator: Box<dyn Simulator>,
    pub analyzer: Box<dyn Analyzer>,
    pub exporter: Box<dyn Exporter>,
}
