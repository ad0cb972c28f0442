//! Local user provider, backed by `getent`/`useradd`/`usermod`/`userdel`.
//!
//! Parameters: `uid`, `gid`, `comment`, `home`, `shell`. Actions: `create`
//! (also reconciles drifted fields on an existing account) and `delete`.

use crate::shell;
use anyhow::{Result, bail};
use convergent::{CurrentState, Node, Provider, Resource};
use log::debug;
use serde_json::{Value, json};

/// `(field, usermod/useradd flag)` for every parameter the provider manages.
const FIELDS: [(&str, &str); 5] = [
    ("uid", "-u"),
    ("gid", "-g"),
    ("comment", "-c"),
    ("home", "-d"),
    ("shell", "-s"),
];

#[derive(Debug)]
pub struct UserProvider;

/// Parse one `getent passwd` line:
/// `deploy:x:1001:1001:Deploy user:/home/deploy:/bin/bash`.
fn parse_passwd_line(line: &str) -> Option<CurrentState> {
    let fields: Vec<&str> = line.trim().split(':').collect();
    if fields.len() < 7 {
        return None;
    }
    let mut state = CurrentState::new();
    state.insert("exists".into(), json!(true));
    state.insert("uid".into(), json!(fields[2]));
    state.insert("gid".into(), json!(fields[3]));
    state.insert("comment".into(), json!(fields[4]));
    state.insert("home".into(), json!(fields[5]));
    state.insert("shell".into(), json!(fields[6]));
    Some(state)
}

/// A desired parameter as flag text. Numbers are accepted for uid/gid.
fn desired_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fields whose desired value differs from the live account.
fn drifted_fields(resource: &Resource, current: &CurrentState) -> Vec<(&'static str, String)> {
    let mut drifted = Vec::new();
    for (field, flag) in FIELDS {
        let Some(want) = resource.params.get(field).and_then(|v| desired_text(v)) else {
            continue;
        };
        let have = current.get(field).and_then(Value::as_str);
        if have != Some(want.as_str()) {
            drifted.push((flag, want));
        }
    }
    drifted
}

impl Provider for UserProvider {
    fn load_current_state(&self, _node: &Node, resource: &Resource) -> Result<CurrentState> {
        let output = shell::run_output("getent", &["passwd", &resource.id.name])?;
        if !output.status.success() {
            let mut state = CurrentState::new();
            state.insert("exists".into(), json!(false));
            return Ok(state);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_passwd_line(&stdout) {
            Some(state) => Ok(state),
            None => bail!("unparseable passwd entry for '{}'", resource.id.name),
        }
    }

    fn converge(
        &self,
        _node: &mut Node,
        resource: &Resource,
        action: &str,
        current: &CurrentState,
    ) -> Result<bool> {
        let name = &resource.id.name;
        let exists = current.get("exists") == Some(&json!(true));

        match action {
            "create" => {
                if !exists {
                    let mut args: Vec<String> = Vec::new();
                    for (flag, value) in drifted_fields(resource, current) {
                        args.push(flag.to_string());
                        args.push(value);
                    }
                    args.push(name.clone());
                    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                    debug!("useradd {name}");
                    shell::run_checked("useradd", &arg_refs)?;
                    return Ok(true);
                }

                let drifted = drifted_fields(resource, current);
                if drifted.is_empty() {
                    return Ok(false);
                }
                let mut args: Vec<String> = Vec::new();
                for (flag, value) in drifted {
                    args.push(flag.to_string());
                    args.push(value);
                }
                args.push(name.clone());
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                debug!("usermod {name}");
                shell::run_checked("usermod", &arg_refs)?;
                Ok(true)
            }
            "delete" => {
                if !exists {
                    return Ok(false);
                }
                debug!("userdel {name}");
                shell::run_checked("userdel", &[name])?;
                Ok(true)
            }
            other => bail!("user provider does not implement action '{other}'"),
        }
    }
}
