use super::config::{AdaptiveConfig, AnalysisConfig, EvaluationType};
use super::error::EngineError;
use crate::core::models::snapshot::Snapshot;
use crate::core::utils::geometry::hull_peel_order;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    Minimize,
    Maximize,
}

/// Sort state carried from one cycle to the next.
///
/// Only the adaptive association/dissociation mode ever changes it; every other evaluation
/// type keeps the objective it starts with. Edge expansion ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RankingState {
    pub objective: Objective,
    pub bound_count: u32,
}

impl RankingState {
    pub fn initial(evaluation: EvaluationType) -> Self {
        let objective = match evaluation {
            EvaluationType::Target
            | EvaluationType::Association
            | EvaluationType::BidirectionalRmsd => Objective::Minimize,
            EvaluationType::Rmsd
            | EvaluationType::Dissociation
            | EvaluationType::AssociationDissociation
            | EvaluationType::EdgeExpansion => Objective::Maximize,
        };
        Self {
            objective,
            bound_count: 0,
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>, EngineError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::io(path, e)),
        };
        toml::from_str(&text)
            .map(Some)
            .map_err(|e| EngineError::Parse {
                path: path.to_path_buf(),
                line: 0,
                message: e.to_string(),
            })
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let text = toml::to_string(self).map_err(|e| EngineError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(|e| EngineError::io(path, e))
    }
}

/// Orders snapshots and evaluates the termination threshold for one evaluation type.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranker {
    evaluation: EvaluationType,
    threshold: Option<f64>,
    adaptive: Option<AdaptiveConfig>,
}

impl Ranker {
    pub fn new(
        evaluation: EvaluationType,
        threshold: Option<f64>,
        adaptive: Option<AdaptiveConfig>,
    ) -> Self {
        Self {
            evaluation,
            threshold,
            adaptive,
        }
    }

    pub fn from_config(analysis: &AnalysisConfig) -> Self {
        Self::new(analysis.evaluation, analysis.threshold, analysis.adaptive)
    }

    pub fn evaluation(&self) -> EvaluationType {
        self.evaluation
    }

    /// Sorts `snapshots` best-first, updating `state` when the adaptive mode flips.
    pub fn rank(&self, mut snapshots: Vec<Snapshot>, state: &mut RankingState) -> Vec<Snapshot> {
        if snapshots.is_empty() {
            return snapshots;
        }
        if self.evaluation.ranks_vectors() {
            return rank_by_hull_layer(snapshots);
        }
        if self.evaluation != EvaluationType::AssociationDissociation {
            sort(&mut snapshots, state.objective);
            return snapshots;
        }
        let Some(adaptive) = self.adaptive else {
            sort(&mut snapshots, state.objective);
            return snapshots;
        };

        sort(&mut snapshots, state.objective);
        match state.objective {
            Objective::Maximize => {
                if snapshots[0].cv.sort_key() > adaptive.reverse_bound {
                    info!(
                        best = snapshots[0].cv.sort_key(),
                        bound = adaptive.reverse_bound,
                        "CV passed the reverse bound, switching to minimization"
                    );
                    state.objective = Objective::Minimize;
                    sort(&mut snapshots, state.objective);
                }
            }
            Objective::Minimize => {
                if snapshots[0].frame < adaptive.frame_window {
                    state.bound_count += 1;
                    if state.bound_count >= adaptive.bound_patience {
                        info!(
                            cycles = state.bound_count,
                            "best frame stayed bound, switching to maximization"
                        );
                        state.objective = Objective::Maximize;
                        state.bound_count = 0;
                        sort(&mut snapshots, state.objective);
                    }
                }
            }
        }
        snapshots
    }

    /// Whether the best snapshot of `ranked` passes the termination threshold.
    pub fn meets_threshold(&self, ranked: &[Snapshot]) -> bool {
        let (Some(best), Some(threshold)) = (ranked.first(), self.threshold) else {
            return false;
        };
        let value = best.cv.sort_key();
        match self.evaluation {
            EvaluationType::Target
            | EvaluationType::Association
            | EvaluationType::BidirectionalRmsd => value < threshold,
            EvaluationType::Rmsd | EvaluationType::Dissociation => value > threshold,
            EvaluationType::AssociationDissociation | EvaluationType::EdgeExpansion => false,
        }
    }
}

/// Outermost hull layer of the CV cloud first, so seeds spread along its edge.
fn rank_by_hull_layer(snapshots: Vec<Snapshot>) -> Vec<Snapshot> {
    let points: Vec<Vec<f64>> = snapshots
        .iter()
        .map(|snapshot| snapshot.cv.components().to_vec())
        .collect();
    let order = hull_peel_order(&points);
    let mut slots: Vec<Option<Snapshot>> = snapshots.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

fn sort(snapshots: &mut [Snapshot], objective: Objective) {
    match objective {
        Objective::Minimize => {
            snapshots.sort_by(|a, b| a.cv.sort_key().total_cmp(&b.cv.sort_key()))
        }
        Objective::Maximize => {
            snapshots.sort_by(|a, b| b.cv.sort_key().total_cmp(&a.cv.sort_key()))
        }
    }
}
