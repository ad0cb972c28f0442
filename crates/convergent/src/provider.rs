//! Providers and platform-keyed provider resolution.
//!
//! A provider is the platform-specific implementation behind a resource
//! type, polymorphic over exactly two capabilities: inspect the live system
//! (`load_current_state`) and reconcile it (`converge`). Providers hold no
//! state across resources; the registry builds a fresh one per resolution.

use crate::context::Node;
use crate::resource::Resource;
use anyhow::Result;
use serde_json::{Map, Value};
use std::fmt;

/// Snapshot of a resource's live state, comparable field-by-field to its
/// desired parameters.
pub type CurrentState = Map<String, Value>;

/// The capability set every provider implements.
pub trait Provider: fmt::Debug {
    /// Inspect the live system and produce a current-state snapshot.
    ///
    /// Inspection failures are resource-level errors; never swallow them
    /// into an "absent" answer.
    fn load_current_state(&self, node: &Node, resource: &Resource) -> Result<CurrentState>;

    /// Compare current vs. desired and mutate only on difference (or for an
    /// inherently non-idempotent action such as `restart`). Returns whether
    /// a mutation was performed.
    ///
    /// The node is mutable so a provider may record discovered facts in the
    /// automatic layer; providers must not touch other layers.
    fn converge(
        &self,
        node: &mut Node,
        resource: &Resource,
        action: &str,
        current: &CurrentState,
    ) -> Result<bool>;
}

/// Platform attributes a registration can be keyed on, read from the node's
/// merged view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Exact platform, e.g. `ubuntu`, `mac_os_x`
    pub platform: String,
    /// Platform family, e.g. `debian`, `rhel`
    pub family: String,
}

impl PlatformInfo {
    /// Read `platform` / `platform_family` from a node's merged view.
    pub fn from_node(node: &Node) -> Self {
        let read = |path: &str| {
            node.attrs
                .read(path)
                .and_then(|v| v.as_str().map(ToString::to_string))
                .unwrap_or_default()
        };
        Self {
            platform: read("platform"),
            family: read("platform_family"),
        }
    }
}

/// How specifically a registration matches a platform.
///
/// Exact platform beats platform family beats a type's default provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformRule {
    /// Match one exact platform
    Platform(String),
    /// Match a whole platform family
    Family(String),
    /// Match anything (the type's default provider)
    Any,
}

impl PlatformRule {
    fn specificity(&self) -> u8 {
        match self {
            PlatformRule::Platform(_) => 2,
            PlatformRule::Family(_) => 1,
            PlatformRule::Any => 0,
        }
    }

    fn matches(&self, platform: &PlatformInfo) -> bool {
        match self {
            PlatformRule::Platform(p) => *p == platform.platform,
            PlatformRule::Family(f) => *f == platform.family,
            PlatformRule::Any => true,
        }
    }
}

/// Builds a provider instance; run once per resolution.
pub type ProviderFactory = Box<dyn Fn() -> Box<dyn Provider> + Send + Sync>;

struct Registration {
    type_tag: String,
    rule: PlatformRule,
    build: ProviderFactory,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("type_tag", &self.type_tag)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

/// Priority-ordered mapping from `(resource type, platform)` to provider.
///
/// Among registrations that match, the most platform-specific rule wins;
/// ties go to the earlier registration.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    entries: Vec<Registration>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory for a resource type under a platform
    /// rule.
    pub fn register(
        &mut self,
        type_tag: impl Into<String>,
        rule: PlatformRule,
        build: impl Fn() -> Box<dyn Provider> + Send + Sync + 'static,
    ) {
        self.entries.push(Registration {
            type_tag: type_tag.into(),
            rule,
            build: Box::new(build),
        });
    }

    /// Resolve the provider for one resource type on one platform.
    ///
    /// `None` means no registration matches; for a resource in the
    /// collection that is a fatal configuration error.
    pub fn resolve(&self, type_tag: &str, platform: &PlatformInfo) -> Option<Box<dyn Provider>> {
        self.entries
            .iter()
            .filter(|r| r.type_tag == type_tag && r.rule.matches(platform))
            .max_by_key(|r| r.rule.specificity())
            .map(|r| (r.build)())
    }
}
