//! Runtime configuration
//!
//! Where the state file and artifact live, how to build, and how fast to
//! tick. This is separate from the tuning block inside the artifact, which
//! the process rewrites itself; this file is only ever written by a human
//! or by `reforge config --init`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::Markers;

/// Environment variable that points every generation at the same config
pub const CONFIG_ENV: &str = "REFORGE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Persistent state record
    #[serde(default)]
    pub state: StateConfig,
    /// Tuning artifact
    #[serde(default)]
    pub artifact: ArtifactConfig,
    /// External build
    #[serde(default)]
    pub build: BuildConfig,
    /// Tick loop
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Synthetic reward
    #[serde(default)]
    pub learning: LearningConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Backing file for the mapped record (default: `<data_dir>/state.dat`)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Text file holding the tuning block
    #[serde(default = "default_artifact_path")]
    pub path: PathBuf,
    /// Block delimiters
    #[serde(default)]
    pub markers: Markers,
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn default_artifact_path() -> PathBuf {
    manifest_dir().join("assets").join("tuning.cfg")
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            path: default_artifact_path(),
            markers: Markers::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build tool executable
    #[serde(default = "default_build_program")]
    pub program: String,
    /// Arguments passed on every build
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,
    /// Flag that forces a full rebuild (e.g. `-B` for make)
    #[serde(default)]
    pub force_flag: Option<String>,
    /// Append `force_flag` to every build
    #[serde(default)]
    pub force: bool,
    /// Directory the build runs in
    #[serde(default = "default_build_dir")]
    pub working_dir: PathBuf,
    /// Executable the build produces and the process is replaced with
    /// (default: the release binary in this crate's target dir; `None` means
    /// the running executable)
    #[serde(default = "default_build_output")]
    pub output: Option<PathBuf>,
    /// Kill the build after this many seconds (default: wait forever)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_build_program() -> String {
    "cargo".to_string()
}

fn default_build_args() -> Vec<String> {
    vec!["build".to_string(), "--release".to_string()]
}

fn default_build_dir() -> PathBuf {
    manifest_dir()
}

fn default_build_output() -> Option<PathBuf> {
    let binary = format!("{}{}", env!("CARGO_PKG_NAME"), std::env::consts::EXE_SUFFIX);
    Some(manifest_dir().join("target").join("release").join(binary))
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            args: default_build_args(),
            force_flag: None,
            force: false,
            working_dir: default_build_dir(),
            output: default_build_output(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Sleep between ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Stop after this many ticks in one process generation
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

fn default_tick_interval() -> u64 {
    1000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Slope of the line rewards are drawn from
    #[serde(default = "default_target_weight")]
    pub target_weight: f64,
    /// Intercept of the line rewards are drawn from
    #[serde(default = "default_target_bias")]
    pub target_bias: f64,
}

fn default_target_weight() -> f64 {
    0.7
}

fn default_target_bias() -> f64 {
    0.2
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            target_weight: default_target_weight(),
            target_bias: default_target_bias(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location. A missing file at the
    /// default location is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = config_path()?;
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    let config = Config::default();
                    config.save_to(&path)?;
                    Ok(config)
                }
            }
        }
    }

    /// Load from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolved backing file for the state record
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state.path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("state.dat")),
        }
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.runtime.tick_interval_ms)
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "reforge", "reforge")
        .context("Failed to get project directories")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
