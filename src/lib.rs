//! Reforge - a learner that rewrites, rebuilds and re-executes itself
//!
//! A long-running process with:
//! - A memory-mapped state record that survives exec and restarts
//! - A scalar delta-rule learner updated every tick
//! - A tuning block embedded in its own build input, mutated on an interval
//! - A rebuild-and-replace controller that execs the freshly built binary
//!
//! # Example
//!
//! ```ignore
//! use reforge::memory::StateStore;
//! use reforge::learning::observe_reward;
//!
//! let mut store = StateStore::open("/tmp/reforge/state.dat")?;
//! observe_reward(&mut store, 1.0, 1.0, 0.05)?;
//! assert!((store.weight() - 0.145).abs() < 1e-12);
//! ```

pub mod error;
pub mod memory;
pub mod learning;
pub mod codec;
pub mod config;
pub mod rebuild;
pub mod agent;
pub mod cli;

pub use agent::{Agent, LiveAgent, TickReport};
pub use codec::{Artifact, ConfigBlock, Markers};
pub use config::Config;
pub use error::{BuildError, CodecError, FatalError, ReplaceError, StorageError, ValidationError};
pub use memory::{StateSnapshot, StateStore};
pub use rebuild::{CycleOutcome, RebuildController, RebuildState};

/// Tuning block this binary was built with
pub const EMBEDDED_TUNING: &str = include_str!("../assets/tuning.cfg");

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - self-rebuilding learner", NAME, VERSION)
}
