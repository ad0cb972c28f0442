//! Automatic-layer fact collection.
//!
//! A minimal inventory pass run before convergence: platform identity, OS,
//! architecture, and hostname land in the node's automatic layer, where the
//! provider resolver (and recipes) read them. A fuller inventory collector
//! can overwrite or extend these through the same layer.

use anyhow::Result;
use attrset::Layer;
use convergent::Node;
use serde_json::json;

/// Platform identity derived from the running OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub platform: String,
    pub family: String,
    pub version: String,
}

/// Populate the node's automatic layer with discovered facts.
pub fn collect(node: &mut Node) -> Result<()> {
    let platform = detect_platform();

    node.attrs.set(Layer::Automatic, "os", json!(std::env::consts::OS))?;
    node.attrs.set(Layer::Automatic, "arch", json!(std::env::consts::ARCH))?;
    node.attrs.set(Layer::Automatic, "platform", json!(platform.platform))?;
    node.attrs.set(
        Layer::Automatic,
        "platform_family",
        json!(platform.family),
    )?;
    node.attrs.set(
        Layer::Automatic,
        "platform_version",
        json!(platform.version),
    )?;
    node.attrs.set(Layer::Automatic, "hostname", json!(hostname()))?;
    Ok(())
}

/// Detect platform and family for provider resolution.
pub fn detect_platform() -> Platform {
    match std::env::consts::OS {
        "macos" => Platform {
            platform: "mac_os_x".to_string(),
            family: "mac_os_x".to_string(),
            version: String::new(),
        },
        "linux" => std::fs::read_to_string("/etc/os-release")
            .map(|content| parse_os_release(&content))
            .unwrap_or_else(|_| Platform {
                platform: "linux".to_string(),
                family: "linux".to_string(),
                version: String::new(),
            }),
        other => Platform {
            platform: other.to_string(),
            family: other.to_string(),
            version: String::new(),
        },
    }
}

/// Map an os-release document to (platform, family, version).
fn parse_os_release(content: &str) -> Platform {
    let mut id = String::new();
    let mut id_like = String::new();
    let mut version = String::new();

    for line in content.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "ID" => id = value,
                "ID_LIKE" => id_like = value,
                "VERSION_ID" => version = value,
                _ => {}
            }
        }
    }

    let family = family_of(&id, &id_like);
    Platform {
        platform: id,
        family,
        version,
    }
}

fn family_of(id: &str, id_like: &str) -> String {
    let known_family = |name: &str| -> Option<&'static str> {
        match name {
            "debian" | "ubuntu" | "linuxmint" | "raspbian" => Some("debian"),
            "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "amzn" | "ol" => Some("rhel"),
            "suse" | "sles" | "opensuse" => Some("suse"),
            "arch" | "archarm" => Some("arch"),
            "alpine" => Some("alpine"),
            _ => None,
        }
    };

    if let Some(family) = known_family(id) {
        return family.to_string();
    }
    for like in id_like.split_whitespace() {
        if let Some(family) = known_family(like) {
            return family.to_string();
        }
    }
    if id.is_empty() { "linux".to_string() } else { id.to_string() }
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|h| h.trim().to_string())
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ubuntu_release_maps_to_debian_family() {
        let content = r#"
NAME="Ubuntu"
VERSION_ID="22.04"
ID=ubuntu
ID_LIKE=debian
"#;
        let platform = parse_os_release(content);
        assert_eq!(platform.platform, "ubuntu");
        assert_eq!(platform.family, "debian");
        assert_eq!(platform.version, "22.04");
    }

    #[test]
    fn rocky_release_maps_to_rhel_family() {
        let content = "ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\nVERSION_ID=\"9.3\"\n";
        let platform = parse_os_release(content);
        assert_eq!(platform.platform, "rocky");
        assert_eq!(platform.family, "rhel");
    }

    #[test]
    fn unknown_id_falls_back_to_id_like() {
        let content = "ID=zorin\nID_LIKE=\"ubuntu debian\"\n";
        assert_eq!(parse_os_release(content).family, "debian");
    }

    #[test]
    fn unknown_distribution_is_its_own_family() {
        let content = "ID=voidlinux\n";
        assert_eq!(parse_os_release(content).family, "voidlinux");
    }

    #[test]
    fn collect_populates_the_automatic_layer() {
        let mut node = Node::new("n");
        collect(&mut node).unwrap();
        assert!(node.attrs.read("platform").is_some());
        assert!(node.attrs.read("platform_family").is_some());
        assert_eq!(
            node.attrs.read("os").unwrap(),
            serde_json::json!(std::env::consts::OS)
        );
    }
}
