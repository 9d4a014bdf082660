//! # Engine Module
//!
//! The stateful layer that turns a validated configuration into executed cycles.
//!
//! ## Overview
//!
//! A cycle moves through `Init → SegmentRun → Analyze → Decide → Export | Terminate`
//! ([`cycle`]). Every step reads its starting point from disk: the replica scheduler consults
//! the per-direction progress ledgers, the analysis stage reuses persisted ranked lists and
//! score tensors, and the export stage appends the marker that closes a cycle. Interrupting a
//! trial at any point and running it again therefore repeats only unfinished work.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Validated trial parameters and their builder
//! - **Error Handling** ([`error`]) - The single error type every stage propagates
//! - **Workers** ([`pool`], [`launch`]) - Bounded fan-out and the guarded process launcher
//! - **Stages** ([`scheduler`], [`analysis`], [`ranking`], [`export`], [`cleanup`]) - One per
//!   cycle phase
//! - **Progress Monitoring** ([`progress`]) - Callback events for front ends

pub mod analysis;
pub mod cleanup;
pub mod config;
pub mod cycle;
pub mod error;
pub mod export;
pub mod launch;
pub mod pool;
pub mod progress;
pub mod ranking;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testing;
