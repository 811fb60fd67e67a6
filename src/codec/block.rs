//! The tuning block and its line format
//!
//! ```text
//! # BEGIN CONFIG
//! LEARNING_RATE=0.050000
//! MUTATION_PROB=0.500000
//! RECOMPILE_INTERVAL=10
//! # END CONFIG
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const KEY_LEARNING_RATE: &str = "LEARNING_RATE";
pub const KEY_MUTATION_PROB: &str = "MUTATION_PROB";
pub const KEY_RECOMPILE_INTERVAL: &str = "RECOMPILE_INTERVAL";

pub const DEFAULT_BEGIN_MARKER: &str = "# BEGIN CONFIG";
pub const DEFAULT_END_MARKER: &str = "# END CONFIG";

/// Delimiters of the block inside the artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markers {
    #[serde(default = "default_begin_marker")]
    pub begin: String,
    #[serde(default = "default_end_marker")]
    pub end: String,
}

fn default_begin_marker() -> String {
    DEFAULT_BEGIN_MARKER.to_string()
}

fn default_end_marker() -> String {
    DEFAULT_END_MARKER.to_string()
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            begin: default_begin_marker(),
            end: default_end_marker(),
        }
    }
}

impl Markers {
    pub fn new(begin: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }

    pub fn is_begin(&self, line: &str) -> bool {
        line.trim() == self.begin
    }

    pub fn is_end(&self, line: &str) -> bool {
        line.trim() == self.end
    }
}

/// Tunables read from the artifact
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfigBlock {
    pub learning_rate: f64,
    pub mutation_probability: f64,
    pub recompile_interval: u64,
}

impl Default for ConfigBlock {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            mutation_probability: 0.5,
            recompile_interval: 10,
        }
    }
}

impl std::fmt::Display for ConfigBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "learning_rate={:.6} mutation_probability={:.6} recompile_interval={}",
            self.learning_rate, self.mutation_probability, self.recompile_interval
        )
    }
}

impl ConfigBlock {
    /// Parse with the default markers
    pub fn parse(text: &str) -> Self {
        parse(text, &Markers::default())
    }

    /// Whether a rebuild is due at `iteration`
    pub fn is_due(&self, iteration: u64) -> bool {
        iteration > 0 && self.recompile_interval > 0 && iteration % self.recompile_interval == 0
    }

    /// Render the body lines that sit between the markers
    pub fn render(&self, newline: &str) -> String {
        format!(
            "{}={:.6}{nl}{}={:.6}{nl}{}={}{nl}",
            KEY_LEARNING_RATE,
            self.learning_rate,
            KEY_MUTATION_PROB,
            self.mutation_probability,
            KEY_RECOMPILE_INTERVAL,
            self.recompile_interval,
            nl = newline,
        )
    }

    /// Apply one `KEY=value` line; unknown keys and bad values are ignored
    fn apply_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            return;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            debug!("Ignoring non key=value line in config block: {:?}", trimmed);
            return;
        };
        let (key, value) = (key.trim(), value.trim());

        match key {
            KEY_LEARNING_RATE => match value.parse::<f64>() {
                Ok(v) if v.is_finite() && v > 0.0 => self.learning_rate = v,
                _ => warn!("Invalid {} value {:?}, keeping default", key, value),
            },
            KEY_MUTATION_PROB => match value.parse::<f64>() {
                Ok(v) if (0.0..=1.0).contains(&v) => self.mutation_probability = v,
                _ => warn!("Invalid {} value {:?}, keeping default", key, value),
            },
            KEY_RECOMPILE_INTERVAL => match value.parse::<u64>() {
                Ok(v) if v >= 1 => self.recompile_interval = v,
                _ => warn!("Invalid {} value {:?}, keeping default", key, value),
            },
            other => debug!("Unknown config key {:?}", other),
        }
    }
}

/// Read the block out of artifact text. Never fails; missing or malformed
/// fields keep their defaults.
pub fn parse(text: &str, markers: &Markers) -> ConfigBlock {
    let mut block = ConfigBlock::default();
    let mut in_block = false;

    for line in text.lines() {
        if !in_block {
            if markers.is_begin(line) {
                in_block = true;
            }
            continue;
        }
        if markers.is_end(line) {
            break;
        }
        block.apply_line(line);
    }

    if !in_block {
        debug!("No begin marker {:?} in artifact, using defaults", markers.begin);
    }
    block
}
