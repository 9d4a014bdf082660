//! Provides the on-disk record formats of a trial.
//!
//! Every artifact the engine relies on for resumption is a small text file with a fixed line
//! grammar: the per-direction progress ledger, the CV logs, and the version stamp. The numeric
//! tables written by external analysis tools are read through [`xvg`].

pub mod cv_log;
pub mod ledger;
pub mod version;
pub mod xvg;
