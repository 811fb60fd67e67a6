//! Config block codec
//!
//! The tuning block is a run of `KEY=value` lines between two marker lines
//! inside a larger text artifact. [`block`] and [`mutate`] work on strings
//! only; [`artifact`] is the thin layer that touches the filesystem.

pub mod artifact;
pub mod block;
pub mod mutate;

pub use artifact::Artifact;
pub use block::{parse, ConfigBlock, Markers};
pub use mutate::{mutate, perturb, Mutation};
