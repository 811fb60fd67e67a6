//! Error taxonomy for the state store and the rebuild protocol
//!
//! Storage and replacement failures are fatal. Codec, build and validation
//! failures are recovered by the tick loop, which logs them and carries on
//! with the current process.

use std::path::PathBuf;
use thiserror::Error;

/// Backing file could not be created, sized, mapped or flushed
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create state directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("failed to open state file {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },

    #[error("failed to resize state file {path} to {len} bytes: {source}")]
    Resize { path: PathBuf, len: u64, source: std::io::Error },

    #[error("failed to map state file {path}: {source}")]
    Map { path: PathBuf, source: std::io::Error },

    #[error("failed to flush state file {path}: {source}")]
    Flush { path: PathBuf, source: std::io::Error },
}

/// Artifact could not be read, located or rewritten
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to read artifact {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("begin marker `{marker}` not found")]
    MissingBeginMarker { marker: String },

    #[error("end marker `{marker}` not found after begin marker")]
    MissingEndMarker { marker: String },

    #[error("marker `{marker}` appears more than once")]
    DuplicateMarker { marker: String },

    #[error("failed to write temporary artifact next to {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("failed to rename temporary artifact over {path}: {source}")]
    Rename { path: PathBuf, source: std::io::Error },
}

/// External build exited unsuccessfully
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to spawn build command `{command}`: {source}")]
    Spawn { command: String, source: std::io::Error },

    #[error("failed waiting for build command `{command}`: {source}")]
    Wait { command: String, source: std::io::Error },

    #[error("build command `{command}` exited with status {code}")]
    ExitCode { command: String, code: i32 },

    #[error("build command `{command}` terminated abnormally ({status})")]
    Abnormal { command: String, status: String },

    #[error("build command `{command}` timed out after {secs}s")]
    TimedOut { command: String, secs: u64 },
}

/// Built executable is missing or cannot be invoked
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("built executable {path} does not exist: {source}")]
    Missing { path: PathBuf, source: std::io::Error },

    #[error("built executable {path} is not a regular file")]
    NotAFile { path: PathBuf },

    #[error("built executable {path} is not executable (permission fix-up failed: {reason})")]
    NotExecutable { path: PathBuf, reason: String },
}

/// Replacing the process image failed; the caller must exit non-zero
#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("failed to exec {path}: {source}")]
    Exec { path: PathBuf, source: std::io::Error },
}

/// Failures that end the tick loop
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Replace(#[from] ReplaceError),
}
