//! CLI interface for reforge

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

use crate::codec::{parse, Artifact};
use crate::config::{self, Config};
use crate::memory::StateStore;
use crate::LiveAgent;

#[derive(Parser)]
#[command(name = "reforge")]
#[command(about = "Self-rebuilding learner with memory-mapped state", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(short, long, global = true, env = "REFORGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tick loop (default when no command given)
    Run {
        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
        /// Override the tick interval in milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,
    },
    /// Show the persisted learner state
    Status,
    /// Reinitialize the persisted learner state to defaults
    Reset,
    /// Show the tuning block in the artifact
    Block,
    /// Mutate the tuning block once, without building
    Mutate {
        /// Perturbation probability in [0, 1] (default: the block's own)
        #[arg(short, long, value_parser = parse_probability)]
        probability: Option<f64>,
        /// Seed for reproducible draws
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Inspect the runtime configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
        /// Print the default config file location
        #[arg(long)]
        path: bool,
        /// Write a default config file (to --config or the default location)
        #[arg(long)]
        init: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Run {
        max_ticks: None,
        tick_ms: None,
    }) {
        Commands::Run { max_ticks, tick_ms } => {
            let mut config = Config::load(config_path)?;
            if let Some(ms) = tick_ms {
                config.runtime.tick_interval_ms = ms;
            }
            let max_ticks = max_ticks.or(config.runtime.max_ticks);

            let mut agent = LiveAgent::from_config(&config, config_path)?;
            agent.run(config.tick_interval(), max_ticks).await?;
        }
        Commands::Status => {
            let config = Config::load(config_path)?;
            let store = open_store(&config)?;
            println!("State file: {}", store.path().display());
            print!("{}", toml::to_string_pretty(&store.snapshot())?);
        }
        Commands::Reset => {
            let config = Config::load(config_path)?;
            let mut store = open_store(&config)?;
            store.reset()?;
            println!("State reset: {}", store.snapshot());
        }
        Commands::Block => {
            let config = Config::load(config_path)?;
            let artifact = Artifact::new(&config.artifact.path, config.artifact.markers.clone());
            let block = artifact.load()?;
            let embedded = parse(crate::EMBEDDED_TUNING, artifact.markers());

            println!("Artifact: {}", artifact.path().display());
            print!("{}", toml::to_string_pretty(&block)?);
            if block == embedded {
                println!("# matches the tuning compiled into this binary");
            } else {
                println!("# this binary was built with: {}", embedded);
            }
        }
        Commands::Mutate { probability, seed } => {
            let config = Config::load(config_path)?;
            let artifact = Artifact::new(&config.artifact.path, config.artifact.markers.clone());
            let probability = match probability {
                Some(p) => p,
                None => artifact.load()?.mutation_probability,
            };
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            let mutation = artifact.mutate(probability, &mut rng)?;
            println!("{}", mutation.previous);
            println!("  -> {}", mutation.block);
        }
        Commands::Config { show, path, init } => {
            if path {
                println!("{}", config::config_path()?.display());
            }
            if init {
                let target = match config_path {
                    Some(p) => p.to_path_buf(),
                    None => config::config_path()?,
                };
                if target.exists() {
                    anyhow::bail!("Config file already exists: {}", target.display());
                }
                Config::default().save_to(&target)?;
                println!("Wrote default config to {}", target.display());
            }
            if show || !(path || init) {
                let config = Config::load(config_path)?;
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<StateStore> {
    let path = config.state_path()?;
    StateStore::open(&path)
        .with_context(|| format!("Failed to open state file {}", path.display()))
}

fn parse_probability(value: &str) -> std::result::Result<f64, String> {
    let p: f64 = value
        .parse()
        .map_err(|e| format!("`{}` is not a number: {}", value, e))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{} is outside [0, 1]", p))
    }
}
