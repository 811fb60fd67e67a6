//! External build invocation
//!
//! The build runs as a child process and the tick loop waits for it. There is
//! no timeout unless one is configured.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::error::BuildError;

/// Summary of a successful build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub command: String,
    pub duration_ms: u64,
}

/// Something that can produce the next executable
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildTool: Send + Sync {
    async fn build(&self) -> Result<BuildReport, BuildError>;
}

/// Runs a configured command, e.g. `cargo build --release`
#[derive(Debug, Clone)]
pub struct CommandBuild {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandBuild {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        let mut args = config.args.clone();
        if config.force {
            if let Some(flag) = &config.force_flag {
                args.push(flag.clone());
            }
        }
        Self {
            program: config.program.clone(),
            args,
            working_dir: Some(config.working_dir.clone()),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn has_timeout(&self) -> bool {
        self.timeout.is_some()
    }

    /// Human-readable command line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl BuildTool for CommandBuild {
    async fn build(&self) -> Result<BuildReport, BuildError> {
        let command = self.command_line();
        info!("Building: {}", command);
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| BuildError::Spawn {
            command: command.clone(),
            source,
        })?;

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    // kill_on_drop reaps it too, but be explicit
                    let _ = child.kill().await;
                    return Err(BuildError::TimedOut {
                        command,
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait().await,
        }
        .map_err(|source| BuildError::Wait {
            command: command.clone(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!("Build finished with {} after {}ms", status, duration_ms);

        if status.success() {
            return Ok(BuildReport {
                command,
                duration_ms,
            });
        }

        match status.code() {
            Some(code) => Err(BuildError::ExitCode { command, code }),
            None => Err(BuildError::Abnormal {
                command,
                status: status.to_string(),
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_appends_force_flag() {
        let config = BuildConfig {
            program: "make".to_string(),
            args: vec!["all".to_string()],
            force_flag: Some("-B".to_string()),
            force: true,
            ..BuildConfig::default()
        };
        assert_eq!(CommandBuild::from_config(&config).command_line(), "make all -B");

        let config = BuildConfig {
            force: false,
            ..config
        };
        assert_eq!(CommandBuild::from_config(&config).command_line(), "make all");
    }

    #[tokio::test]
    async fn test_successful_build() {
        let report = CommandBuild::new("true").build().await.unwrap();
        assert_eq!(report.command, "true");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let err = CommandBuild::new("sh")
            .arg("-c")
            .arg("exit 3")
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::ExitCode { code: 3, .. }));
    }

    #[tokio::test]
    async fn test_signal_termination_is_abnormal() {
        let err = CommandBuild::new("sh")
            .arg("-c")
            .arg("kill -9 $$")
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Abnormal { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let err = CommandBuild::new("definitely_not_a_real_build_tool_12345")
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_build() {
        let err = CommandBuild::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        CommandBuild::new("sh")
            .arg("-c")
            .arg("touch built.marker")
            .working_dir(dir.path())
            .build()
            .await
            .unwrap();
        assert!(dir.path().join("built.marker").exists());
    }
}
