//! On-disk layout of the persisted learner record
//!
//! Little-endian, no padding. The layout is shared between process
//! generations, so any change here must bump [`VERSION`].
//!
//! ```text
//! offset  width  field
//!      0      4  magic           u32
//!      4      4  version         u32
//!      8      8  iteration       u64
//!     16      8  weight          f64
//!     24      8  bias            f64
//!     32      8  running_reward  f64
//!     40    256  scratch         UTF-8, NUL padded
//! ```

use serde::Serialize;
use std::ops::Range;

/// Identifies a reforge state record (`RFRG` on disk)
pub const MAGIC: u32 = 0x4752_4652;

/// Current record layout version
pub const VERSION: u32 = 1;

/// Scratch note capacity in bytes
pub const SCRATCH_LEN: usize = 256;

/// Total record size in bytes
pub const RECORD_SIZE: usize = 40 + SCRATCH_LEN;

pub(crate) const MAGIC_AT: Range<usize> = 0..4;
pub(crate) const VERSION_AT: Range<usize> = 4..8;
pub(crate) const ITERATION_AT: Range<usize> = 8..16;
pub(crate) const WEIGHT_AT: Range<usize> = 16..24;
pub(crate) const BIAS_AT: Range<usize> = 24..32;
pub(crate) const RUNNING_REWARD_AT: Range<usize> = 32..40;
pub(crate) const SCRATCH_AT: Range<usize> = 40..RECORD_SIZE;

pub const DEFAULT_WEIGHT: f64 = 0.1;
pub const DEFAULT_BIAS: f64 = 0.0;
pub const DEFAULT_RUNNING_REWARD: f64 = 0.0;

pub(crate) fn read_u32(buf: &[u8], at: Range<usize>) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at]);
    u32::from_le_bytes(raw)
}

pub(crate) fn write_u32(buf: &mut [u8], at: Range<usize>, value: u32) {
    buf[at].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u64(buf: &[u8], at: Range<usize>) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at]);
    u64::from_le_bytes(raw)
}

pub(crate) fn write_u64(buf: &mut [u8], at: Range<usize>, value: u64) {
    buf[at].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_f64(buf: &[u8], at: Range<usize>) -> f64 {
    f64::from_bits(read_u64(buf, at))
}

pub(crate) fn write_f64(buf: &mut [u8], at: Range<usize>, value: f64) {
    write_u64(buf, at, value.to_bits());
}

/// Decode the scratch field up to the first NUL
pub(crate) fn read_scratch(buf: &[u8]) -> String {
    let raw = &buf[SCRATCH_AT];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Encode `text` into the scratch field, truncated on a char boundary
pub(crate) fn write_scratch(buf: &mut [u8], text: &str) -> usize {
    let mut end = text.len().min(SCRATCH_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let field = &mut buf[SCRATCH_AT];
    field.fill(0);
    field[..end].copy_from_slice(&text.as_bytes()[..end]);
    end
}

/// Point-in-time copy of the record for display. Never written back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub iteration: u64,
    pub weight: f64,
    pub bias: f64,
    pub running_reward: f64,
    pub scratch: String,
}

impl StateSnapshot {
    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            iteration: read_u64(buf, ITERATION_AT),
            weight: read_f64(buf, WEIGHT_AT),
            bias: read_f64(buf, BIAS_AT),
            running_reward: read_f64(buf, RUNNING_REWARD_AT),
            scratch: read_scratch(buf),
        }
    }

    /// The values a freshly initialized record holds
    pub fn defaults() -> Self {
        Self {
            iteration: 0,
            weight: DEFAULT_WEIGHT,
            bias: DEFAULT_BIAS,
            running_reward: DEFAULT_RUNNING_REWARD,
            scratch: String::new(),
        }
    }
}

impl std::fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "iteration={} weight={:.6} bias={:.6} running_reward={:.6}",
            self.iteration, self.weight, self.bias, self.running_reward
        )
    }
}
