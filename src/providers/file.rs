//! Plain-file provider.
//!
//! Desired-state parameters: `path` (defaults to the resource name),
//! `content`, and on Unix an octal `mode` string such as `"0644"`.

use anyhow::{Context, Result, bail};
use convergent::{CurrentState, Node, Provider, Resource};
use log::debug;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub struct FileProvider;

impl FileProvider {
    fn target_path<'a>(resource: &'a Resource) -> &'a str {
        resource.param_str("path").unwrap_or(&resource.id.name)
    }
}

impl Provider for FileProvider {
    fn load_current_state(&self, _node: &Node, resource: &Resource) -> Result<CurrentState> {
        let path = Path::new(Self::target_path(resource));
        let mut state = CurrentState::new();

        if !path.exists() {
            state.insert("exists".into(), json!(false));
            return Ok(state);
        }
        state.insert("exists".into(), json!(true));

        if resource.params.contains_key("content") {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            state.insert("content".into(), json!(content));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(path)
                .with_context(|| format!("inspecting {}", path.display()))?;
            let mode = metadata.permissions().mode() & 0o7777;
            state.insert("mode".into(), json!(format!("{mode:04o}")));
        }

        Ok(state)
    }

    fn converge(
        &self,
        _node: &mut Node,
        resource: &Resource,
        action: &str,
        current: &CurrentState,
    ) -> Result<bool> {
        let path = Path::new(Self::target_path(resource));
        let exists = current.get("exists") == Some(&json!(true));

        match action {
            "create" => {
                let desired_content = resource.param_str("content");
                let content_differs = match desired_content {
                    Some(want) => current.get("content").and_then(Value::as_str) != Some(want),
                    None => false,
                };
                let desired_mode = resource.param_str("mode");
                let mode_differs = match desired_mode {
                    Some(want) => {
                        current.get("mode").and_then(Value::as_str)
                            != Some(normalize_mode(want)?.as_str())
                    }
                    None => false,
                };

                if exists && !content_differs && !mode_differs {
                    return Ok(false);
                }

                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                if !exists || content_differs {
                    debug!("writing {}", path.display());
                    fs::write(path, desired_content.unwrap_or_default())
                        .with_context(|| format!("writing {}", path.display()))?;
                }
                if let Some(mode) = desired_mode {
                    apply_mode(path, mode)?;
                }
                Ok(true)
            }
            "delete" => {
                if !exists {
                    return Ok(false);
                }
                debug!("removing {}", path.display());
                fs::remove_file(path)
                    .with_context(|| format!("removing {}", path.display()))?;
                Ok(true)
            }
            other => bail!("file provider does not implement action '{other}'"),
        }
    }
}

/// Render an octal mode string in the canonical `%04o` form.
fn normalize_mode(mode: &str) -> Result<String> {
    let bits = u32::from_str_radix(mode, 8)
        .with_context(|| format!("'{mode}' is not an octal mode"))?;
    Ok(format!("{:04o}", bits & 0o7777))
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = u32::from_str_radix(mode, 8)
        .with_context(|| format!("'{mode}' is not an octal mode"))?;
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
        .with_context(|| format!("setting mode on {}", path.display()))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: &str) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn converge_once(resource: &Resource, action: &str) -> bool {
        let provider = FileProvider;
        let mut node = Node::new("n");
        let current = provider.load_current_state(&node, resource).unwrap();
        provider.converge(&mut node, resource, action, &current).unwrap()
    }

    #[test]
    fn create_writes_then_reports_in_sync() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.conf");
        let resource = Resource::new("file", path.to_str().unwrap(), "create")
            .with_param("content", json!("port = 8080\n"));

        assert!(converge_once(&resource, "create"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "port = 8080\n");
        // Second pass finds nothing to do.
        assert!(!converge_once(&resource, "create"));
    }

    #[test]
    fn drifted_content_is_rewritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.conf");
        fs::write(&path, "stale").unwrap();

        let resource = Resource::new("file", path.to_str().unwrap(), "create")
            .with_param("content", json!("fresh"));
        assert!(converge_once(&resource, "create"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh");
    }

    #[cfg(unix)]
    #[test]
    fn mode_is_applied_and_idempotent() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("secret");
        let resource = Resource::new("file", path.to_str().unwrap(), "create")
            .with_param("content", json!(""))
            .with_param("mode", json!("0600"));

        assert!(converge_once(&resource, "create"));
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
        assert!(!converge_once(&resource, "create"));
    }

    #[test]
    fn delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gone");
        fs::write(&path, "x").unwrap();

        let resource = Resource::new("file", path.to_str().unwrap(), "delete");
        assert!(converge_once(&resource, "delete"));
        assert!(!path.exists());
        assert!(!converge_once(&resource, "delete"));
    }

    #[test]
    fn unknown_action_is_an_error() {
        let provider = FileProvider;
        let mut node = Node::new("n");
        let resource = Resource::new("file", "/tmp/x", "chmod");
        let err = provider
            .converge(&mut node, &resource, "chmod", &CurrentState::new())
            .unwrap_err();
        assert!(err.to_string().contains("chmod"));
    }
}
