//! # Workflows Module
//!
//! Top-level entry points of the library. A workflow takes a validated
//! [`PacsConfig`](crate::engine::config::PacsConfig) and the chosen
//! [`Collaborators`](crate::backends::Collaborators), drives the engine and reports progress
//! through a [`ProgressReporter`](crate::engine::progress::ProgressReporter).
//!
//! - **Trial Workflow** ([`trial`]) - runs or resumes a trial cycle by cycle until it converges
//!   or reaches its last cycle, and reads back per-cycle completion for status queries.

pub mod trial;
