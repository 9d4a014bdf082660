//! # Core Module
//!
//! Stateless building blocks of the PaCS engine: the data model, the on-disk record formats,
//! the directory layout of a trial, and the shell command runner used to drive external tools.
//!
//! ## Architecture
//!
//! - **Data Model** ([`models`]) - Directions, replica indices, snapshots and score tensors
//! - **Records** ([`io`]) - Progress ledgers, CV logs, version stamps and tool output tables
//! - **Layout** ([`layout`]) - Path resolution for `trial{NNN}/cycle{NNN}/{fore,back}/replica{NNN}`
//! - **Utilities** ([`utils`]) - `sh -c` command execution with per-command log files
//!
//! Nothing in this module knows about cycles as a process; that belongs to [`crate::engine`].

pub mod io;
pub mod layout;
pub mod models;
pub mod utils;
