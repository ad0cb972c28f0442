//! Directory provider.
//!
//! Parameters: `path` (defaults to the resource name), optional octal
//! `mode`. `create` makes intermediate directories as well.

use anyhow::{Context, Result, bail};
use convergent::{CurrentState, Node, Provider, Resource};
use log::debug;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub struct DirectoryProvider;

impl Provider for DirectoryProvider {
    fn load_current_state(&self, _node: &Node, resource: &Resource) -> Result<CurrentState> {
        let path = Path::new(target_path(resource));
        let mut state = CurrentState::new();

        if !path.is_dir() {
            state.insert("exists".into(), json!(false));
            return Ok(state);
        }
        state.insert("exists".into(), json!(true));

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
        let path = Path::new(target_path(resource));
        let exists = current.get("exists") == Some(&json!(true));

        match action {
            "create" => {
                let desired_mode = resource.param_str("mode");
                let mode_differs = match desired_mode {
                    Some(want) => {
                        let want = u32::from_str_radix(want, 8)
                            .with_context(|| format!("'{want}' is not an octal mode"))?;
                        current.get("mode").and_then(Value::as_str)
                            != Some(format!("{:04o}", want & 0o7777).as_str())
                    }
                    None => false,
                };
                if exists && !mode_differs {
                    return Ok(false);
                }

                if !exists {
                    debug!("creating directory {}", path.display());
                    fs::create_dir_all(path)
                        .with_context(|| format!("creating {}", path.display()))?;
                }
                #[cfg(unix)]
                if let Some(mode) = desired_mode {
                    use std::os::unix::fs::PermissionsExt;
                    let bits = u32::from_str_radix(mode, 8)
                        .with_context(|| format!("'{mode}' is not an octal mode"))?;
                    fs::set_permissions(path, fs::Permissions::from_mode(bits))
                        .with_context(|| format!("setting mode on {}", path.display()))?;
                }
                Ok(true)
            }
            "delete" => {
                if !exists {
                    return Ok(false);
                }
                debug!("removing directory {}", path.display());
                fs::remove_dir_all(path)
                    .with_context(|| format!("removing {}", path.display()))?;
                Ok(true)
            }
            other => bail!("directory provider does not implement action '{other}'"),
        }
    }
}

fn target_path(resource: &Resource) -> &str {
    resource.param_str("path").unwrap_or(&resource.id.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn converge_once(resource: &Resource, action: &str) -> bool {
        let provider = DirectoryProvider;
        let mut node = Node::new("n");
        let current = provider.load_current_state(&node, resource).unwrap();
        provider.converge(&mut node, resource, action, &current).unwrap()
    }

    #[test]
    fn create_makes_nested_directories_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c");
        let resource = Resource::new("directory", path.to_str().unwrap(), "create");

        assert!(converge_once(&resource, "create"));
        assert!(path.is_dir());
        assert!(!converge_once(&resource, "create"));
    }

    #[test]
    fn delete_removes_the_tree() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old");
        fs::create_dir_all(path.join("nested")).unwrap();

        let resource = Resource::new("directory", path.to_str().unwrap(), "delete");
        assert!(converge_once(&resource, "delete"));
        assert!(!path.exists());
        assert!(!converge_once(&resource, "delete"));
    }
}
