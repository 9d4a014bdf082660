//! Helpers shared by the engine and the backends.

pub mod command;
pub mod geometry;
