//! Subprocess helpers shared by providers and guards.

use anyhow::{Context, Result};
use std::process::{Command, Output, Stdio};

/// Run a command and capture trimmed stdout; nonzero exit is an error.
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "Command failed: {} {}: {}",
            cmd,
            args.join(" "),
            stderr.trim()
        )
    }
}

/// Run a command and return its raw output; spawn failure is the only error.
pub fn run_output(cmd: &str, args: &[&str]) -> Result<Output> {
    Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))
}

/// Run a command silently; nonzero exit is an error carrying stderr.
pub fn run_checked(cmd: &str, args: &[&str]) -> Result<()> {
    let output = run_output(cmd, args)?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "Command failed: {} {}: {}",
            cmd,
            args.join(" "),
            stderr.trim()
        )
    }
}

/// Run a command silently, returning success/failure only.
pub fn run_quiet(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_capture_returns_stdout() {
        assert_eq!(run_capture("echo", &["hello"]).unwrap(), "hello");
    }

    #[test]
    fn run_capture_fails_on_nonzero_exit() {
        assert!(run_capture("false", &[]).is_err());
    }

    #[test]
    fn run_quiet_reflects_exit_status() {
        assert!(run_quiet("true", &[]));
        assert!(!run_quiet("false", &[]));
    }
}
