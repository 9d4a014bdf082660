//! Trial configuration files.
//!
//! A kebab-case TOML document with top-level `max-cycle`, `n-replica`, `n-parallel` and
//! `working-dir`, plus the sections `[simulation]` (with `[simulation.fore]` and
//! `[simulation.back]`), `[analysis]` (with `[analysis.adaptive]`), `[export]`, `[cleanup]` and
//! `[launch]`. Unknown keys are rejected.

mod builder;
mod file;

pub use builder::build_config;
