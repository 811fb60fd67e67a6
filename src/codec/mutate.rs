//! Randomized rewrite of the tuning block
//!
//! Pure text in, text out. Everything outside the block, including both
//! marker lines, is copied through untouched.

use rand::Rng;
use tracing::debug;

use super::block::{parse, ConfigBlock, Markers};
use crate::error::CodecError;

/// Relative jitter applied to the learning rate
pub const LEARNING_RATE_JITTER: f64 = 0.25;
/// Replacement for a learning rate that stopped being positive
pub const LEARNING_RATE_FLOOR: f64 = 0.001;
/// Absolute jitter applied to the mutation probability
pub const PROBABILITY_JITTER: f64 = 0.1;
pub const PROBABILITY_MIN: f64 = 0.01;
pub const PROBABILITY_MAX: f64 = 0.99;
/// Largest step applied to the recompile interval
pub const INTERVAL_STEP: i64 = 2;

/// Result of rewriting an artifact
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Full artifact text with the new block
    pub text: String,
    /// Block as it was parsed before the rewrite
    pub previous: ConfigBlock,
    /// Block as written
    pub block: ConfigBlock,
}

/// Byte offsets of the block inside the artifact
struct BlockSpan {
    /// First byte after the begin-marker line
    body_start: usize,
    /// First byte of the end-marker line
    body_end: usize,
    /// Line terminator used by the begin-marker line
    newline: &'static str,
}

fn locate(text: &str, markers: &Markers) -> Result<BlockSpan, CodecError> {
    let mut begin: Option<(usize, &'static str)> = None;
    let mut end: Option<usize> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if markers.is_begin(line) {
            if begin.is_some() {
                return Err(CodecError::DuplicateMarker { marker: markers.begin.clone() });
            }
            let newline = if line.ends_with("\r\n") { "\r\n" } else { "\n" };
            begin = Some((offset, newline));
        } else if markers.is_end(line) {
            if end.is_some() {
                return Err(CodecError::DuplicateMarker { marker: markers.end.clone() });
            }
            end = Some(line_start);
        }
    }

    let (body_start, newline) = begin.ok_or_else(|| CodecError::MissingBeginMarker {
        marker: markers.begin.clone(),
    })?;
    let body_end = end
        .filter(|&at| at >= body_start)
        .ok_or_else(|| CodecError::MissingEndMarker { marker: markers.end.clone() })?;

    Ok(BlockSpan {
        body_start,
        body_end,
        newline,
    })
}

fn jitter<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    1.0 + rng.random_range(-LEARNING_RATE_JITTER..LEARNING_RATE_JITTER)
}

/// Draw a perturbed block from `current`.
///
/// Each perturbation decision is an independent `U[0,1) < mutation_probability`
/// draw. The learning rate always gets one jitter and has no upper bound.
pub fn perturb<R: Rng + ?Sized>(
    current: &ConfigBlock,
    mutation_probability: f64,
    rng: &mut R,
) -> ConfigBlock {
    let mut learning_rate = current.learning_rate * jitter(rng);
    if rng.random::<f64>() < mutation_probability {
        learning_rate *= jitter(rng);
    }
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        learning_rate = LEARNING_RATE_FLOOR;
    }

    let mut probability = current.mutation_probability;
    if rng.random::<f64>() < mutation_probability {
        probability += rng.random_range(-PROBABILITY_JITTER..PROBABILITY_JITTER);
    }
    let probability = probability.clamp(PROBABILITY_MIN, PROBABILITY_MAX);

    let mut interval = current.recompile_interval;
    if rng.random::<f64>() < mutation_probability {
        let step = rng.random_range(-INTERVAL_STEP..=INTERVAL_STEP);
        interval = interval.saturating_add_signed(step);
    }
    let interval = interval.max(1);

    ConfigBlock {
        learning_rate,
        mutation_probability: probability,
        recompile_interval: interval,
    }
}

/// Replace the block in `text` with freshly perturbed values
pub fn mutate<R: Rng + ?Sized>(
    text: &str,
    markers: &Markers,
    mutation_probability: f64,
    rng: &mut R,
) -> Result<Mutation, CodecError> {
    let span = locate(text, markers)?;
    let previous = parse(text, markers);
    let block = perturb(&previous, mutation_probability, rng);

    let body = block.render(span.newline);
    let mut out = String::with_capacity(text.len() + body.len());
    out.push_str(&text[..span.body_start]);
    out.push_str(&body);
    out.push_str(&text[span.body_end..]);

    debug!("Mutated config block: {} -> {}", previous, block);

    Ok(Mutation {
        text: out,
        previous,
        block,
    })
}
