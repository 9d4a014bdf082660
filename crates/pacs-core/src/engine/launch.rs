use super::config::LaunchConfig;
use super::error::EngineError;
use crate::core::utils::command::{CommandError, ShellCommand};
use std::io;
use std::path::PathBuf;
use std::process::Child;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything needed to run one simulation segment (or one grouped batch of segments).
///
/// `setup` commands run once, in order, before the main command. When `liveness` is non-empty
/// the main command is launched under the flakiness guard: every listed file must appear within
/// the configured timeout, otherwise the process is killed and relaunched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub setup: Vec<ShellCommand>,
    pub main: ShellCommand,
    pub liveness: Vec<PathBuf>,
}

impl LaunchPlan {
    pub fn new(main: ShellCommand) -> Self {
        Self {
            setup: Vec::new(),
            main,
            liveness: Vec::new(),
        }
    }

    pub fn with_setup(mut self, command: ShellCommand) -> Self {
        self.setup.push(command);
        self
    }

    pub fn with_liveness(mut self, path: impl Into<PathBuf>) -> Self {
        self.liveness.push(path.into());
        self
    }
}

enum Attempt {
    Started(Child),
    Stalled,
}

pub fn execute(plan: &LaunchPlan, launch: &LaunchConfig) -> Result<(), EngineError> {
    for command in &plan.setup {
        command.run()?;
    }
    if plan.liveness.is_empty() {
        plan.main.run()?;
        return Ok(());
    }

    for attempt in 1..=launch.max_attempts {
        clear_liveness(plan)?;
        match try_launch(plan, launch)? {
            Attempt::Started(mut child) => {
                if attempt > 1 {
                    info!(attempt, command = %plan.main.script(), "launch succeeded after retry");
                }
                let status = child.wait().map_err(|source| CommandError::Spawn {
                    script: plan.main.script().to_string(),
                    source,
                })?;
                plan.main.check(status)?;
                return Ok(());
            }
            Attempt::Stalled => {
                warn!(
                    attempt,
                    max_attempts = launch.max_attempts,
                    command = %plan.main.script(),
                    "no sign of life, relaunching"
                );
                thread::sleep(launch.cooldown);
            }
        }
    }

    Err(EngineError::LaunchExhausted {
        script: plan.main.script().to_string(),
        liveness: plan.liveness[0].clone(),
        attempts: launch.max_attempts,
    })
}

fn try_launch(plan: &LaunchPlan, launch: &LaunchConfig) -> Result<Attempt, EngineError> {
    let mut child = plan.main.spawn()?;
    let started = Instant::now();
    loop {
        if liveness_present(plan) {
            return Ok(Attempt::Started(child));
        }
        let exited = child
            .try_wait()
            .map_err(|source| CommandError::Spawn {
                script: plan.main.script().to_string(),
                source,
            })?
            .is_some();
        if exited {
            // A process that wrote its liveness files and exited still counts as started.
            if liveness_present(plan) {
                return Ok(Attempt::Started(child));
            }
            debug!(command = %plan.main.script(), "process exited before producing liveness files");
            return Ok(Attempt::Stalled);
        }
        if started.elapsed() >= launch.liveness_timeout {
            kill(&mut child);
            return Ok(Attempt::Stalled);
        }
        thread::sleep(launch.poll_interval);
    }
}

fn liveness_present(plan: &LaunchPlan) -> bool {
    plan.liveness.iter().all(|path| path.exists())
}

fn clear_liveness(plan: &LaunchPlan) -> Result<(), EngineError> {
    for path in &plan.liveness {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale liveness file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(EngineError::io(path, e)),
        }
    }
    Ok(())
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "kill failed, process already gone");
    }
    let _ = child.wait();
}
