//! The tick loop
//!
//! Each tick runs the cognition cycle, one learning step and the rebuild
//! controller, in that order. Everything the next tick needs is in the
//! mapped state record or the artifact; nothing carries over in memory that
//! a process replacement would lose.

pub mod cycle;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codec::{parse, Artifact};
use crate::config::{Config, CONFIG_ENV};
use crate::error::FatalError;
use crate::learning::{observe_reward, Observation, RewardSource};
use crate::memory::StateStore;
use crate::rebuild::{
    BuildTool, CommandBuild, CycleOutcome, ExecReplacer, ProcessReplacer, RebuildController,
};

/// What one tick did
#[derive(Debug)]
pub struct TickReport {
    pub iteration: u64,
    pub observation: Observation,
    pub outcome: CycleOutcome,
}

/// Agent wired to the real build tool and exec
pub type LiveAgent = Agent<CommandBuild, ExecReplacer, StdRng>;

pub struct Agent<B, P, G> {
    store: StateStore,
    controller: RebuildController<B, P, G>,
    reward: RewardSource,
    rng: StdRng,
}

impl<B, P, G> Agent<B, P, G>
where
    B: BuildTool,
    P: ProcessReplacer,
    G: rand::Rng,
{
    pub fn new(
        store: StateStore,
        controller: RebuildController<B, P, G>,
        reward: RewardSource,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            controller,
            reward,
            rng,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn controller(&self) -> &RebuildController<B, P, G> {
        &self.controller
    }

    /// Run one tick. Only storage and exec failures are errors.
    pub async fn tick(&mut self) -> Result<TickReport, FatalError> {
        let input = self.reward.sample_input(&mut self.rng);

        let percept = cycle::perceive(&self.store, input);
        let thought = cycle::reason(&percept);
        let action = cycle::decide(&thought);
        let iteration = cycle::act(&mut self.store, &action)?;

        let reward = self.reward.reward(input);
        let learning_rate = self.controller.config().learning_rate;
        let observation = observe_reward(&mut self.store, input, reward, learning_rate)?;

        info!(
            "Iteration {}: {} | w={:.4} b={:.4} avg_reward={:.4}",
            iteration,
            self.store.scratch(),
            observation.weight,
            observation.bias,
            observation.running_reward
        );

        let outcome = self.controller.on_tick(iteration, &self.store).await?;
        if !matches!(outcome, CycleOutcome::NotDue) {
            debug!("Rebuild cycle at iteration {}: {}", iteration, outcome);
        }

        Ok(TickReport {
            iteration,
            observation,
            outcome,
        })
    }

    /// Tick until Ctrl-C, `max_ticks`, or a fatal error
    pub async fn run(&mut self, interval: Duration, max_ticks: Option<u64>) -> Result<(), FatalError> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(interval, max_ticks, ctrl_c).await
    }

    /// Tick until `shutdown` resolves, `max_ticks`, or a fatal error.
    ///
    /// `shutdown` lives across ticks, so a request that arrives mid-tick
    /// (e.g. during a build) stops the loop before the next sleep.
    pub async fn run_until<S>(
        &mut self,
        interval: Duration,
        max_ticks: Option<u64>,
        shutdown: S,
    ) -> Result<(), FatalError>
    where
        S: Future<Output = ()>,
    {
        info!(
            "Agent started at iteration {} (tick every {}ms, {})",
            self.store.iteration(),
            interval.as_millis(),
            self.controller.config()
        );

        tokio::pin!(shutdown);
        // Poll once so the listener is registered before the first tick
        let mut stopping = tokio::select! {
            biased;
            _ = &mut shutdown => true,
            _ = std::future::ready(()) => false,
        };

        let mut ticks = 0u64;
        while !stopping {
            self.tick().await?;
            ticks += 1;

            if max_ticks.is_some_and(|max| ticks >= max) {
                info!("Reached {} ticks, stopping", ticks);
                break;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => stopping = true,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        if stopping {
            info!("Interrupted, stopping at iteration {}", self.store.iteration());
        }
        self.store.flush()?;
        Ok(())
    }
}

impl LiveAgent {
    /// Wire the agent from runtime config. `config_path` is forwarded to the
    /// next generation through the environment.
    pub fn from_config(config: &Config, config_path: Option<&Path>) -> Result<Self> {
        let state_path = config.state_path()?;
        let store = StateStore::open(&state_path)
            .with_context(|| format!("Failed to open state file {}", state_path.display()))?;
        info!("State {:?}: {}", store.path(), store.snapshot());

        let artifact = Artifact::new(&config.artifact.path, config.artifact.markers.clone());

        let builder = CommandBuild::from_config(&config.build);
        if !builder.has_timeout() {
            warn!("No build timeout configured; a hung build blocks the tick loop indefinitely");
        }

        let mut replacer = ExecReplacer::new();
        if let Some(path) = config_path {
            let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            replacer = replacer.with_env(CONFIG_ENV, absolute);
        }

        let mut controller =
            RebuildController::new(artifact, builder, replacer, StdRng::from_os_rng());
        if let Some(output) = &config.build.output {
            controller = controller.with_target(output);
        }
        info!("Rebuild target {:?}", controller.target());

        log_generation(&controller, config);

        Ok(Self::new(
            store,
            controller,
            RewardSource::from_config(&config.learning),
            StdRng::from_os_rng(),
        ))
    }
}

/// Compare the tuning compiled into this binary with the artifact on disk
fn log_generation<B, P, G>(controller: &RebuildController<B, P, G>, config: &Config)
where
    B: BuildTool,
    P: ProcessReplacer,
    G: rand::Rng,
{
    let embedded = parse(crate::EMBEDDED_TUNING, &config.artifact.markers);
    if embedded == *controller.config() {
        info!("Running binary was built from the current tuning ({})", embedded);
    } else {
        info!(
            "Artifact tuning ({}) differs from the tuning compiled into this binary ({})",
            controller.config(),
            embedded
        );
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::codec::Markers;
    use crate::rebuild::build::MockBuildTool;
    use crate::rebuild::replace::MockProcessReplacer;
    use tempfile::{tempdir, TempDir};

    fn agent_with<B: BuildTool>(
        builder: B,
        probability: f64,
        interval: u64,
    ) -> (TempDir, Agent<B, MockProcessReplacer, StdRng>) {
        let dir = tempdir().unwrap();
        let artifact_path = dir.path().join("tuning.cfg");
        std::fs::write(
            &artifact_path,
            format!(
                "# BEGIN CONFIG\nMUTATION_PROB={:.6}\nRECOMPILE_INTERVAL={}\n# END CONFIG\n",
                probability, interval
            ),
        )
        .unwrap();

        let controller = RebuildController::new(
            Artifact::new(&artifact_path, Markers::default()),
            builder,
            MockProcessReplacer::new(),
            StdRng::seed_from_u64(1),
        )
        .with_target(dir.path().join("never-built"));
        let store = StateStore::open(dir.path().join("state.dat")).unwrap();
        let agent = Agent::new(store, controller, RewardSource::default(), StdRng::seed_from_u64(2));
        (dir, agent)
    }

    #[tokio::test]
    async fn test_shutdown_during_build_stops_before_next_sleep() {
        let build = CommandBuild::new("sh").arg("-c").arg("sleep 0.3; exit 1");
        let (_dir, mut agent) = agent_with(build, 1.0, 1);

        // Resolves while the first tick is still waiting on the build
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        tokio::time::timeout(
            Duration::from_secs(10),
            agent.run_until(Duration::from_secs(3600), None, shutdown),
        )
        .await
        .expect("loop kept sleeping after shutdown")
        .unwrap();

        assert_eq!(agent.store().iteration(), 1);
    }

    #[tokio::test]
    async fn test_resolved_shutdown_runs_no_ticks() {
        let (_dir, mut agent) = agent_with(MockBuildTool::new(), 0.5, 1000);
        agent
            .run_until(Duration::from_millis(1), None, std::future::ready(()))
            .await
            .unwrap();
        assert_eq!(agent.store().iteration(), 0);
    }

    #[tokio::test]
    async fn test_max_ticks_stops_loop() {
        let (_dir, mut agent) = agent_with(MockBuildTool::new(), 0.5, 1000);
        agent
            .run_until(Duration::from_millis(1), Some(3), std::future::pending())
            .await
            .unwrap();
        assert_eq!(agent.store().iteration(), 3);
    }
}
