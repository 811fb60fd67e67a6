//! Rebuild-and-replace state machine
//!
//! ```text
//! Running -> MaybeMutate -> Mutated -> Building -> Validated -> Replacing
//!    ^            |            |          |            |
//!    +------------+------------+----------+------------+   (failure edges)
//! ```
//!
//! Every edge back to `Running` re-reads the tuning block from the artifact,
//! so a half-finished cycle never leaves stale values in memory. Reaching
//! `Replacing` ends the process on success.

use rand::Rng;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::build::BuildTool;
use super::replace::{invocation_name, resolve_self_path, ProcessReplacer};
use super::validate::validate_executable;
use crate::codec::{Artifact, ConfigBlock};
use crate::error::{BuildError, CodecError, ReplaceError, StorageError, ValidationError};
use crate::memory::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildState {
    Running,
    MaybeMutate,
    Mutated,
    Building,
    Validated,
    Replacing,
}

impl std::fmt::Display for RebuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebuildState::Running => write!(f, "running"),
            RebuildState::MaybeMutate => write!(f, "maybe-mutate"),
            RebuildState::Mutated => write!(f, "mutated"),
            RebuildState::Building => write!(f, "building"),
            RebuildState::Validated => write!(f, "validated"),
            RebuildState::Replacing => write!(f, "replacing"),
        }
    }
}

/// How a tick came back to `Running`
#[derive(Debug)]
pub enum CycleOutcome {
    /// Not a rebuild tick
    NotDue,
    /// Rebuild tick, but the draw did not select a mutation
    Skipped { draw: f64 },
    MutationFailed(CodecError),
    BuildFailed(BuildError),
    ValidationFailed(ValidationError),
    /// The state record could not be flushed, so replacement was abandoned
    FlushFailed(StorageError),
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::NotDue => write!(f, "not due"),
            CycleOutcome::Skipped { draw } => write!(f, "skipped (draw {:.3})", draw),
            CycleOutcome::MutationFailed(e) => write!(f, "mutation failed: {}", e),
            CycleOutcome::BuildFailed(e) => write!(f, "build failed: {}", e),
            CycleOutcome::ValidationFailed(e) => write!(f, "validation failed: {}", e),
            CycleOutcome::FlushFailed(e) => write!(f, "state flush failed: {}", e),
        }
    }
}

/// Drives mutate → build → validate → replace
pub struct RebuildController<B, P, G> {
    artifact: Artifact,
    builder: B,
    replacer: P,
    rng: G,
    target: PathBuf,
    argv0: OsString,
    config: ConfigBlock,
    state: RebuildState,
}

impl<B, P, G> RebuildController<B, P, G>
where
    B: BuildTool,
    P: ProcessReplacer,
    G: Rng,
{
    /// Create a controller targeting the running executable. The tuning
    /// block is read from the artifact immediately.
    pub fn new(artifact: Artifact, builder: B, replacer: P, rng: G) -> Self {
        let mut controller = Self {
            artifact,
            builder,
            replacer,
            rng,
            target: resolve_self_path(),
            argv0: invocation_name(),
            config: ConfigBlock::default(),
            state: RebuildState::Running,
        };
        controller.reload_config();
        controller
    }

    /// Exec this path instead of the running executable
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_argv0(mut self, argv0: impl Into<OsString>) -> Self {
        self.argv0 = argv0.into();
        self
    }

    pub fn config(&self) -> &ConfigBlock {
        &self.config
    }

    pub fn state(&self) -> RebuildState {
        self.state
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Re-read the block from disk; keeps the current values if unreadable
    pub fn reload_config(&mut self) -> &ConfigBlock {
        match self.artifact.load() {
            Ok(block) => {
                if block != self.config {
                    info!("Config block now {}", block);
                }
                self.config = block;
            }
            Err(e) => warn!("Keeping in-memory config {}: {}", self.config, e),
        }
        &self.config
    }

    fn transition(&mut self, next: RebuildState) {
        debug!("Rebuild state {} -> {}", self.state, next);
        self.state = next;
    }

    fn back_to_running(&mut self, outcome: CycleOutcome) -> CycleOutcome {
        self.transition(RebuildState::Running);
        self.reload_config();
        outcome
    }

    /// Run the rebuild protocol for this tick.
    ///
    /// Every recoverable failure comes back as a [`CycleOutcome`]. `Err` means
    /// the exec itself failed and the caller must exit non-zero. On success
    /// this never returns.
    pub async fn on_tick(
        &mut self,
        iteration: u64,
        store: &StateStore,
    ) -> Result<CycleOutcome, ReplaceError> {
        if !self.config.is_due(iteration) {
            return Ok(CycleOutcome::NotDue);
        }

        self.transition(RebuildState::MaybeMutate);
        let draw: f64 = self.rng.random();
        if draw >= self.config.mutation_probability {
            info!(
                "Iteration {}: draw {:.3} >= {:.3}, no mutation",
                iteration, draw, self.config.mutation_probability
            );
            return Ok(self.back_to_running(CycleOutcome::Skipped { draw }));
        }

        info!("Iteration {}: mutating {:?}", iteration, self.artifact.path());
        if let Err(e) = self.artifact.mutate(self.config.mutation_probability, &mut self.rng) {
            warn!("Mutation skipped: {}", e);
            return Ok(self.back_to_running(CycleOutcome::MutationFailed(e)));
        }
        self.transition(RebuildState::Mutated);

        self.transition(RebuildState::Building);
        match self.builder.build().await {
            Ok(report) => info!("Build `{}` succeeded in {}ms", report.command, report.duration_ms),
            Err(e) => {
                warn!("Build failed, continuing with current binary: {}", e);
                return Ok(self.back_to_running(CycleOutcome::BuildFailed(e)));
            }
        }

        if let Err(e) = validate_executable(&self.target) {
            warn!("Not restarting: {}", e);
            return Ok(self.back_to_running(CycleOutcome::ValidationFailed(e)));
        }
        self.transition(RebuildState::Validated);

        if let Err(e) = store.flush() {
            error!("Not restarting, state could not be flushed: {}", e);
            return Ok(self.back_to_running(CycleOutcome::FlushFailed(e)));
        }

        self.transition(RebuildState::Replacing);
        info!("Restarting into {:?} at iteration {}", self.target, iteration);
        let err = match self.replacer.replace(&self.target, &self.argv0) {
            Ok(never) => match never {},
            Err(e) => e,
        };
        error!("Process replacement failed: {}", err);
        Err(err)
    }
}
