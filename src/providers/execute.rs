//! Arbitrary-command provider.
//!
//! `execute` resources are inherently non-idempotent: running one always
//! counts as an update. Idempotence is expressed through `only_if`/`not_if`
//! guards on the resource itself.

use crate::shell;
use anyhow::{Result, bail};
use convergent::{CurrentState, Node, Provider, Resource};
use log::debug;

#[derive(Debug)]
pub struct ExecuteProvider;

impl Provider for ExecuteProvider {
    fn load_current_state(&self, _node: &Node, _resource: &Resource) -> Result<CurrentState> {
        // Nothing to inspect; the command either runs or it does not.
        Ok(CurrentState::new())
    }

    fn converge(
        &self,
        _node: &mut Node,
        resource: &Resource,
        action: &str,
        _current: &CurrentState,
    ) -> Result<bool> {
        if action != "run" {
            bail!("execute provider does not implement action '{action}'");
        }
        let command = resource.param_str("command").unwrap_or(&resource.id.name);
        debug!("executing: {command}");
        shell::run_checked("sh", &["-c", command])?;
        Ok(true)
    }
}
