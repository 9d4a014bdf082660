//! # PaCS Core Library
//!
//! Orchestration engine for parallel cascade selection (PaCS) molecular dynamics: many short
//! simulations per generation, scored on a collective variable, with the best snapshots seeding
//! the next generation until a threshold or the last cycle is reached.
//!
//! ## Architectural Philosophy
//!
//! The library keeps MD and trajectory analysis numerics out of process. It builds command lines
//! for external engines and tools, runs them, and keeps every decision it makes on disk so a trial
//! can be resumed exactly where it stopped.
//!
//! - **[`core`]: The Foundation.** Data model, record formats (ledgers, CV logs, score archives),
//!   trial directory layout and shell command execution.
//!
//! - **[`engine`]: The Logic Core.** Configuration, the replica scheduler, CV analysis and
//!   ranking, export of the next generation, and the per-cycle state machine.
//!
//! - **[`backends`]: The Adapters.** GROMACS, AMBER and NAMD simulators, `gmx`/`cpptraj`/script
//!   analyzers and exporters, all behind the collaborator traits the engine depends on.
//!
//! - **[`workflows`]: The Public API.** Runs or resumes a whole trial and reports its status.

pub mod backends;
pub mod core;
pub mod engine;
pub mod workflows;
