//! Rebuild-and-replace
//!
//! Provides:
//! - Randomized mutation of the tuning artifact on a recompile interval
//! - External build invocation (optionally time-limited)
//! - Validation of the produced executable
//! - In-place process replacement via exec

pub mod build;
pub mod controller;
pub mod replace;
pub mod validate;

pub use build::{BuildReport, BuildTool, CommandBuild};
pub use controller::{CycleOutcome, RebuildController, RebuildState};
pub use replace::{resolve_self_path, ExecReplacer, ProcessReplacer};
pub use validate::validate_executable;
