use super::config::PacsConfig;
use super::error::EngineError;
use super::pool::WorkerPool;
use crate::backends::analyzer::fill;
use crate::backends::traits::Simulator;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::utils::command::{ShellCommand, quote_path};
use std::path::PathBuf;
use tracing::{debug, info};

fn replica_dirs(config: &PacsConfig, cycle: CycleIndex) -> Vec<(Direction, ReplicaId, PathBuf)> {
    let layout = config.layout();
    Direction::ALL
        .into_iter()
        .flat_map(|direction| {
            (1..=config.replicas_in(cycle)).map(move |replica| (direction, replica))
        })
        .map(|(direction, replica)| {
            (direction, replica, layout.replica_dir(cycle, direction, replica))
        })
        .collect()
}

/// Runs the configured reduction command once per replica of a finished cycle.
///
/// Template placeholders: `{cycle}`, `{direction}`, `{replica}`, `{replica_dir}` and
/// `{trajectory}`.
pub fn reduce_trajectories(
    config: &PacsConfig,
    pool: &WorkerPool,
    cycle: CycleIndex,
) -> Result<(), EngineError> {
    let Some(template) = config.cleanup.reduce_command.as_deref() else {
        return Ok(());
    };
    let units = replica_dirs(config, cycle);
    info!(cycle, replicas = units.len(), "reducing trajectories");
    let extension = &config.simulation.trajectory_extension;
    pool.run_batches(
        &units,
        |(direction, replica, _)| {
            format!("reduction of cycle {} {} replica {}", cycle, direction, replica)
        },
        |(direction, replica, dir)| {
            let script = fill(
                template,
                &[
                    ("cycle", cycle.to_string()),
                    ("direction", direction.to_string()),
                    ("replica", replica.to_string()),
                    ("replica_dir", quote_path(dir)),
                    ("trajectory", quote_path(&dir.join(format!("prd{}", extension)))),
                ],
            );
            ShellCommand::new(script)
                .with_log(dir.join("reduce.log"))
                .run()
                .map_err(EngineError::from)
        },
        |_| Ok(()),
    )?;
    Ok(())
}

/// Deletes the simulator's intermediate files from every replica directory of `cycle` and
/// returns how many were removed.
pub fn remove_intermediates(
    config: &PacsConfig,
    simulator: &dyn Simulator,
    cycle: CycleIndex,
) -> Result<usize, EngineError> {
    if !config.cleanup.remove_intermediates {
        return Ok(0);
    }
    let patterns = simulator.cleanup_patterns(config, cycle);
    if patterns.is_empty() {
        return Ok(0);
    }

    let mut removed = 0;
    for (_, _, dir) in replica_dirs(config, cycle) {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(EngineError::io(&dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::io(&dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if patterns.iter().any(|pattern| wildcard_match(pattern, name)) {
                let path = entry.path();
                debug!(path = %path.display(), "removing");
                std::fs::remove_file(&path).map_err(|e| EngineError::io(&path, e))?;
                removed += 1;
            }
        }
    }
    info!(cycle, removed, "intermediate files removed");
    Ok(removed)
}

/// Shell-style file name match where `*` spans any run of characters and `?` one character.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::CleanupConfig;
    use crate::engine::testing::{MockSimulator, test_config};
    use tempfile::tempdir;

    mod patterns {
        use super::*;

        #[test]
        fn stars_and_literals() {
            assert!(wildcard_match("*.cpt", "prd.cpt"));
            assert!(wildcard_match("*.cpt", ".cpt"));
            assert!(!wildcard_match("*.cpt", "prd.cpt.bak"));
            assert!(wildcard_match("#*#", "#prd.log.1#"));
            assert!(!wildcard_match("#*#", "prd.log"));
            assert!(wildcard_match("prd.gro", "prd.gro"));
            assert!(!wildcard_match("prd.gro", "prd.gro2"));
            assert!(wildcard_match("prd?.log", "prd1.log"));
            assert!(wildcard_match("a*b*c", "axxbyyc"));
        }
    }

    mod files {
        use super::*;

        #[test]
        fn only_matching_files_are_removed() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| {
                b.cleanup(CleanupConfig {
                    remove_intermediates: true,
                    reduce_command: None,
                })
            });
            config.layout().create_cycle_tree(1, 4).unwrap();
            let dir = config.layout().replica_dir(1, Direction::Back, 2);
            std::fs::write(dir.join("a.tmp"), "").unwrap();
            std::fs::write(dir.join("prd.xtc"), "").unwrap();

            let removed = remove_intermediates(&config, &MockSimulator::new(), 1).unwrap();

            assert_eq!(removed, 1);
            assert!(!dir.join("a.tmp").exists());
            assert!(dir.join("prd.xtc").exists());
        }

        #[test]
        fn disabled_cleanup_keeps_everything() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| b);
            config.layout().create_cycle_tree(1, 4).unwrap();
            let file = config.layout().replica_dir(1, Direction::Fore, 1).join("a.tmp");
            std::fs::write(&file, "").unwrap();

            assert_eq!(remove_intermediates(&config, &MockSimulator::new(), 1).unwrap(), 0);
            assert!(file.exists());
        }

        #[test]
        fn reduction_runs_in_every_replica_directory() {
            let work = tempdir().unwrap();
            let config = test_config(work.path(), |b| {
                b.cleanup(CleanupConfig {
                    remove_intermediates: false,
                    reduce_command: Some(
                        "echo {direction}{replica} > {replica_dir}/reduced".into(),
                    ),
                })
            });
            config.layout().create_cycle_tree(1, 4).unwrap();
            let pool = WorkerPool::new(2).unwrap();

            reduce_trajectories(&config, &pool, 1).unwrap();

            let marker = config.layout().replica_dir(1, Direction::Back, 3).join("reduced");
            assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "back3");
        }
    }
}
