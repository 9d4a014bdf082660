//! # Core Models Module
//!
//! Plain data types shared by every layer of the PaCS engine.
//!
//! ## Key Components
//!
//! - [`ids`] - Trial, cycle and replica indices and the two evolution [`ids::Direction`]s
//! - [`snapshot`] - A scored trajectory frame and its scalar or vector collective variable
//! - [`scores`] - Dense pairwise score tensors produced by two-ended evaluations
//!
//! None of these types perform I/O of their own beyond the binary score archive; the text
//! artifacts built from them live in [`crate::core::io`].

pub mod ids;
pub mod scores;
pub mod snapshot;
