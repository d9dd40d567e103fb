//! Process invocation capability.
//!
//! The ingest pipeline shells out to external extraction tools. Wrapping
//! that behind a trait keeps the callers unit-testable with a scripted
//! fake instead of a real toolchain.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Runs external programs on behalf of the pipeline.
///
/// Implementations must forward the child's standard error to the service's
/// own diagnostic stream so operator-visible tool output is not swallowed.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `program` with `args`, optionally in working directory `cwd`,
    /// and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the program cannot be started and
    /// [`Error::ToolFailed`] if it exits with a non-zero status.
    async fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<()>;
}

/// [`ProcessRunner`] that executes real processes via the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<()> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let status = cmd.status().await.map_err(|source| Error::Spawn {
            program: program.to_string(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::ToolFailed {
                program: program.to_string(),
                status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn run_succeeds_for_zero_exit() -> Result<()> {
        SystemRunner.run("true", &[], None).await?;
        Ok(())
    }

    #[tokio::test]
    async fn run_reports_nonzero_exit() {
        let err = SystemRunner
            .run("false", &[], None)
            .await
            .expect_err("false must fail");
        assert!(matches!(err, Error::ToolFailed { ref program, .. } if program == "false"));
    }

    #[tokio::test]
    async fn run_reports_missing_program() {
        let err = SystemRunner
            .run("quarry-no-such-tool", &[], None)
            .await
            .expect_err("missing tool must fail");
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn run_respects_working_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        SystemRunner
            .run("sh", &["-c", "pwd > marker"], Some(dir.path()))
            .await?;
        let marker = std::fs::read_to_string(dir.path().join("marker"))?;
        assert_eq!(
            std::path::Path::new(marker.trim()).canonicalize()?,
            dir.path().canonicalize()?
        );
        Ok(())
    }
}
