//! systemd service provider.
//!
//! Parameters: `service` (defaults to the resource name). Actions: `start`,
//! `stop`, `enable`, `disable`, `restart`, `reload`. The first four compare
//! against live unit state; restart and reload always act.

use crate::shell;
use anyhow::{Result, bail};
use convergent::{CurrentState, Node, Provider, Resource};
use log::debug;
use serde_json::json;

#[derive(Debug)]
pub struct SystemdProvider;

fn unit_name(resource: &Resource) -> &str {
    resource.param_str("service").unwrap_or(&resource.id.name)
}

impl Provider for SystemdProvider {
    fn load_current_state(&self, _node: &Node, resource: &Resource) -> Result<CurrentState> {
        let unit = unit_name(resource);
        let mut state = CurrentState::new();
        state.insert(
            "running".into(),
            json!(shell::run_quiet("systemctl", &["is-active", "--quiet", unit])),
        );
        state.insert(
            "enabled".into(),
            json!(shell::run_quiet("systemctl", &["is-enabled", "--quiet", unit])),
        );
        Ok(state)
    }

    fn converge(
        &self,
        _node: &mut Node,
        resource: &Resource,
        action: &str,
        current: &CurrentState,
    ) -> Result<bool> {
        let unit = unit_name(resource);
        let running = current.get("running") == Some(&json!(true));
        let enabled = current.get("enabled") == Some(&json!(true));

        let act = |verb: &str| -> Result<bool> {
            debug!("systemctl {verb} {unit}");
            shell::run_checked("systemctl", &[verb, unit])?;
            Ok(true)
        };

        match action {
            "start" if running => Ok(false),
            "start" => act("start"),
            "stop" if !running => Ok(false),
            "stop" => act("stop"),
            "enable" if enabled => Ok(false),
            "enable" => act("enable"),
            "disable" if !enabled => Ok(false),
            "disable" => act("disable"),
            // Non-idempotent by nature.
            "restart" => act("restart"),
            "reload" => act("reload"),
            other => bail!("service provider does not implement action '{other}'"),
        }
    }
}
