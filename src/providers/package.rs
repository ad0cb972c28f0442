//! Package providers: apt (debian family), yum/dnf (rhel family), and
//! Homebrew (mac_os_x).
//!
//! Parameters: `package` (defaults to the resource name) and an optional
//! exact `version`. Actions: `install`, `remove`, `upgrade`.

use crate::shell;
use anyhow::{Result, bail};
use convergent::{CurrentState, Node, Provider, Resource};
use log::debug;
use serde_json::{Value, json};

fn package_name(resource: &Resource) -> &str {
    resource.param_str("package").unwrap_or(&resource.id.name)
}

fn installed_version(current: &CurrentState) -> Option<&str> {
    current.get("version").and_then(Value::as_str)
}

fn state(installed: Option<&str>, candidate: Option<&str>) -> CurrentState {
    let mut state = CurrentState::new();
    state.insert("installed".into(), json!(installed.is_some()));
    if let Some(version) = installed {
        state.insert("version".into(), json!(version));
    }
    if let Some(version) = candidate {
        state.insert("candidate".into(), json!(version));
    }
    state
}

/// Whether `install` has anything to do given what is on the system.
fn install_needed(resource: &Resource, current: &CurrentState) -> bool {
    match installed_version(current) {
        None => true,
        Some(have) => match resource.param_str("version") {
            Some(want) => have != want,
            None => false,
        },
    }
}

// ---------------------------------------------------------------------------
// apt

/// `Installed:` / `Candidate:` lines from `apt-cache policy`.
#[derive(Debug, Default, PartialEq, Eq)]
struct AptPolicy {
    installed: Option<String>,
    candidate: Option<String>,
}

fn parse_apt_policy(output: &str) -> AptPolicy {
    let field = |prefix: &str| -> Option<String> {
        output
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix(prefix))
            .map(str::trim)
            .filter(|v| *v != "(none)")
            .map(ToString::to_string)
    };
    AptPolicy {
        installed: field("Installed:"),
        candidate: field("Candidate:"),
    }
}

#[derive(Debug)]
pub struct AptProvider;

impl Provider for AptProvider {
    fn load_current_state(&self, _node: &Node, resource: &Resource) -> Result<CurrentState> {
        let name = package_name(resource);
        let policy = parse_apt_policy(&shell::run_capture("apt-cache", &["policy", name])?);
        Ok(state(policy.installed.as_deref(), policy.candidate.as_deref()))
    }

    fn converge(
        &self,
        _node: &mut Node,
        resource: &Resource,
        action: &str,
        current: &CurrentState,
    ) -> Result<bool> {
        let name = package_name(resource);
        match action {
            "install" => {
                if !install_needed(resource, current) {
                    return Ok(false);
                }
                let spec = match resource.param_str("version") {
                    Some(version) => format!("{name}={version}"),
                    None => name.to_string(),
                };
                debug!("apt-get install {spec}");
                shell::run_checked("apt-get", &["install", "-y", &spec])?;
                Ok(true)
            }
            "remove" => {
                if installed_version(current).is_none() {
                    return Ok(false);
                }
                shell::run_checked("apt-get", &["remove", "-y", name])?;
                Ok(true)
            }
            "upgrade" => {
                let installed = installed_version(current);
                let candidate = current.get("candidate").and_then(Value::as_str);
                if installed.is_some() && installed == candidate {
                    return Ok(false);
                }
                shell::run_checked("apt-get", &["install", "-y", name])?;
                Ok(true)
            }
            other => bail!("apt provider does not implement action '{other}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// yum / dnf

fn rpm_installed_version(name: &str) -> Result<Option<String>> {
    let output = shell::run_output("rpm", &["-q", "--qf", "%{VERSION}-%{RELEASE}", name])?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
}

#[derive(Debug)]
pub struct YumProvider;

impl Provider for YumProvider {
    fn load_current_state(&self, _node: &Node, resource: &Resource) -> Result<CurrentState> {
        let installed = rpm_installed_version(package_name(resource))?;
        Ok(state(installed.as_deref(), None))
    }

    fn converge(
        &self,
        _node: &mut Node,
        resource: &Resource,
        action: &str,
        current: &CurrentState,
    ) -> Result<bool> {
        let name = package_name(resource);
        match action {
            "install" => {
                if !install_needed(resource, current) {
                    return Ok(false);
                }
                let spec = match resource.param_str("version") {
                    Some(version) => format!("{name}-{version}"),
                    None => name.to_string(),
                };
                shell::run_checked("yum", &["install", "-y", &spec])?;
                Ok(true)
            }
            "remove" => {
                if installed_version(current).is_none() {
                    return Ok(false);
                }
                shell::run_checked("yum", &["remove", "-y", name])?;
                Ok(true)
            }
            "upgrade" => {
                if installed_version(current).is_none() {
                    shell::run_checked("yum", &["install", "-y", name])?;
                    return Ok(true);
                }
                // yum has no cheap candidate query; update and compare.
                shell::run_checked("yum", &["update", "-y", name])?;
                let after = rpm_installed_version(name)?;
                Ok(after.as_deref() != installed_version(current))
            }
            other => bail!("yum provider does not implement action '{other}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Homebrew

/// First version token of a `brew list --versions` line, e.g.
/// `nginx 1.25.3 1.25.2` -> `1.25.3`.
fn parse_brew_versions(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(ToString::to_string)
}

#[derive(Debug)]
pub struct HomebrewProvider;

impl Provider for HomebrewProvider {
    fn load_current_state(&self, _node: &Node, resource: &Resource) -> Result<CurrentState> {
        let name = package_name(resource);
        let output = shell::run_output("brew", &["list", "--versions", name])?;
        let installed = if output.status.success() {
            parse_brew_versions(&String::from_utf8_lossy(&output.stdout))
        } else {
            None
        };
        Ok(state(installed.as_deref(), None))
    }

    fn converge(
        &self,
        _node: &mut Node,
        resource: &Resource,
        action: &str,
        current: &CurrentState,
    ) -> Result<bool> {
        let name = package_name(resource);
        match action {
            "install" => {
                if !install_needed(resource, current) {
                    return Ok(false);
                }
                shell::run_checked("brew", &["install", name])?;
                Ok(true)
            }
            "remove" => {
                if installed_version(current).is_none() {
                    return Ok(false);
                }
                shell::run_checked("brew", &["uninstall", name])?;
                Ok(true)
            }
            "upgrade" => {
                if installed_version(current).is_none() {
                    shell::run_checked("brew", &["install", name])?;
                    return Ok(true);
                }
                shell::run_checked("brew", &["upgrade", name])?;
                let output = shell::run_output("brew", &["list", "--versions", name])?;
                let after = parse_brew_versions(&String::from_utf8_lossy(&output.stdout));
                Ok(after.as_deref() != installed_version(current))
            }
            other => bail!("homebrew provider does not implement action '{other}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apt_policy_parses_installed_and_candidate() {
        let output = "nginx:\n  Installed: 1.18.0-6ubuntu14.4\n  Candidate: 1.18.0-6ubuntu14.5\n  Version table:\n";
        let policy = parse_apt_policy(output);
        assert_eq!(policy.installed.as_deref(), Some("1.18.0-6ubuntu14.4"));
        assert_eq!(policy.candidate.as_deref(), Some("1.18.0-6ubuntu14.5"));
    }

    #[test]
    fn apt_policy_treats_none_as_absent() {
        let output = "nginx:\n  Installed: (none)\n  Candidate: 1.18.0-6ubuntu14\n";
        let policy = parse_apt_policy(output);
        assert_eq!(policy.installed, None);
        assert_eq!(policy.candidate.as_deref(), Some("1.18.0-6ubuntu14"));
    }

    #[test]
    fn brew_versions_takes_the_first_listed() {
        assert_eq!(
            parse_brew_versions("nginx 1.25.3 1.25.2\n").as_deref(),
            Some("1.25.3")
        );
        assert_eq!(parse_brew_versions(""), None);
    }

    #[test]
    fn install_is_a_no_op_when_satisfied() {
        let resource = Resource::new("package", "nginx", "install");
        let current = state(Some("1.18.0"), None);
        assert!(!install_needed(&resource, &current));

        let pinned = resource.clone().with_param("version", json!("1.20.0"));
        assert!(install_needed(&pinned, &current));

        assert!(install_needed(&resource, &state(None, None)));
    }
}
