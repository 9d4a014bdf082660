use super::config::PacsConfig;
use super::error::EngineError;
use super::pool::WorkerPool;
use crate::backends::traits::Exporter;
use crate::core::io::ledger::ProgressLedger;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::models::snapshot::Snapshot;
use tracing::{error, info};

/// Seeds the next cycle of `direction` from the best `n_replica` snapshots of `ranked`.
///
/// Rank `i` (0-based) becomes `replica{i+1}` of `cycle + 1`. The export marker is appended to
/// the ledger of (`cycle`, `direction`) only after every seed was written.
pub fn export_next_generation(
    config: &PacsConfig,
    exporter: &dyn Exporter,
    pool: &WorkerPool,
    cycle: CycleIndex,
    direction: Direction,
    ranked: &[Snapshot],
) -> Result<(), EngineError> {
    let required = config.n_replica as usize;
    if ranked.len() < required {
        error!(
            cycle,
            %direction,
            available = ranked.len(),
            required,
            "not enough ranked snapshots to seed the next cycle"
        );
        return Err(EngineError::InsufficientMaterial {
            cycle,
            direction,
            available: ranked.len(),
            required,
        });
    }

    let layout = config.layout();
    let next = cycle + 1;
    layout
        .create_cycle_tree(next, config.n_replica)
        .map_err(|e| EngineError::io(layout.cycle_dir(next), e))?;

    let seeds: Vec<(ReplicaId, &Snapshot)> = ranked
        .iter()
        .take(required)
        .enumerate()
        .map(|(rank, snapshot)| (rank as ReplicaId + 1, snapshot))
        .collect();
    pool.run_batches(
        &seeds,
        |(target, snapshot)| format!("export of {} to cycle {} replica {}", snapshot, next, target),
        |&(target, snapshot)| exporter.export_snapshot(config, cycle, direction, snapshot, target),
        |_| Ok(()),
    )?;

    ProgressLedger::new(layout.ledger_file(cycle, direction)).append_export_completed(next)?;
    info!(cycle, %direction, seeds = seeds.len(), "next cycle seeded");
    Ok(())
}
