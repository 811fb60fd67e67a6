//! Persistent state - the learner record shared across process generations
//!
//! A fixed-size binary record is mapped from a backing file. It outlives any
//! single process: a re-executed binary maps the same file and resumes from
//! whatever the previous generation flushed.

pub mod record;
pub mod store;

pub use record::{StateSnapshot, RECORD_SIZE};
pub use store::StateStore;
