//! Shell-backed guard evaluation.

use anyhow::{Context, Result};
use convergent::{GuardEvaluator, GuardTest};
use std::process::{Command, Stdio};

/// Evaluates `only_if`/`not_if` commands through `sh -c`.
///
/// Exit status zero counts as true. A command that
/// cannot be spawned at all is an evaluation error, which the engine treats
/// as fatal for the guarded resource rather than as a skip.
pub struct ShellGuardEvaluator;

impl GuardEvaluator for ShellGuardEvaluator {
    fn eval(&self, test: &GuardTest) -> Result<bool> {
        let GuardTest::Command(cmd) = test;
        let status = Command::new("sh")
            .args(["-c", cmd])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("Failed to evaluate guard: {cmd}"))?;
        Ok(status.success())
    }
}
