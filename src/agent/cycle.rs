//! Perceive → reason → decide → act
//!
//! Placeholder cognition. Only `act` has an effect: it records a note in the
//! scratch field and advances the persisted iteration counter.

use chrono::Local;

use crate::error::StorageError;
use crate::memory::StateStore;

#[derive(Debug, Clone, PartialEq)]
pub struct Percept {
    pub iteration: u64,
    pub input: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thought(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct Action(pub String);

pub fn perceive(store: &StateStore, input: f64) -> Percept {
    Percept {
        iteration: store.iteration(),
        input,
    }
}

pub fn reason(percept: &Percept) -> Thought {
    Thought(format!(
        "I perceived: tick {} (x={:.3})",
        percept.iteration, percept.input
    ))
}

pub fn decide(thought: &Thought) -> Action {
    Action(format!("recorded '{}'", thought.0))
}

/// Write the note, advance the counter, flush. Returns the new iteration.
pub fn act(store: &mut StateStore, action: &Action) -> Result<u64, StorageError> {
    let note = format!("[{}] {}", Local::now().format("%H:%M:%S"), action.0);
    store.set_scratch(&note);
    let iteration = store.advance_iteration();
    store.flush()?;
    Ok(iteration)
}
