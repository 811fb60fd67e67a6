//! Process image replacement
//!
//! A successful replacement never returns: the calling process is gone and
//! the new image starts from `main`. The replacer's return type only has room
//! for the failure.

use std::convert::Infallible;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ReplaceError;

/// Suffix Linux appends to `/proc/self/exe` once the binary was replaced
const DELETED_SUFFIX: &str = " (deleted)";

/// Replaces the running process with another executable
#[cfg_attr(test, mockall::automock)]
pub trait ProcessReplacer {
    /// Exec `exe` with `argv0` as the only argument. Returns only on failure.
    fn replace(&self, exe: &Path, argv0: &OsStr) -> Result<Infallible, ReplaceError>;
}

/// `execv` via [`std::os::unix::process::CommandExt::exec`]
#[derive(Debug, Clone, Default)]
pub struct ExecReplacer {
    envs: Vec<(OsString, OsString)>,
}

impl ExecReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an extra variable in the replaced image's environment
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl ProcessReplacer for ExecReplacer {
    #[cfg(unix)]
    fn replace(&self, exe: &Path, argv0: &OsStr) -> Result<Infallible, ReplaceError> {
        use std::os::unix::process::CommandExt;

        info!("Replacing process image with {:?}", exe);
        let mut cmd = std::process::Command::new(exe);
        cmd.arg0(argv0);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        let source = cmd.exec();
        Err(ReplaceError::Exec {
            path: exe.to_path_buf(),
            source,
        })
    }

    #[cfg(not(unix))]
    fn replace(&self, exe: &Path, _argv0: &OsStr) -> Result<Infallible, ReplaceError> {
        Err(ReplaceError::Exec {
            path: exe.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "process replacement requires exec",
            ),
        })
    }
}

/// Path of the running executable, falling back to `argv[0]`
pub fn resolve_self_path() -> PathBuf {
    match std::env::current_exe() {
        Ok(path) => strip_deleted_suffix(path),
        Err(e) => {
            let fallback = invocation_name();
            warn!("Could not resolve own executable ({}), using {:?}", e, fallback);
            PathBuf::from(fallback)
        }
    }
}

/// The name this process was invoked as
pub fn invocation_name() -> OsString {
    std::env::args_os()
        .next()
        .unwrap_or_else(|| OsString::from(env!("CARGO_PKG_NAME")))
}

fn strip_deleted_suffix(path: PathBuf) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_suffix(DELETED_SUFFIX)) {
        Some(stripped) => PathBuf::from(stripped),
        None => path,
    }
}
