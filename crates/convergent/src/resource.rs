//! Resource declarations.
//!
//! A resource is a declarative unit of desired system state: a type tag, a
//! unique name, a parameter mapping, the action to take, guards that can
//! suppress it, and notification edges to other resources.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identity of a resource: `(type, name)`, displayed as `type[name]`.
///
/// Duplicate identities within one run are a compile-time error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    /// Resource type tag, e.g. `package`, `service`, `file`
    pub type_tag: String,
    /// Unique name within the type, e.g. `nginx`
    pub name: String,
}

impl ResourceId {
    /// Build an identity from its two parts.
    pub fn new(type_tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_tag, self.name)
    }
}

/// When a notification's target action runs relative to the notifying
/// resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyTiming {
    /// Run the target's action right away, out of normal sequence
    Immediate,
    /// Queue the target's action until the whole collection has been walked
    Delayed,
}

/// An outgoing notification edge.
///
/// The target is referenced by identity, never by position: it may be
/// declared before or after the notifying resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// When the target runs
    pub timing: NotifyTiming,
    /// Identity of the resource to re-invoke
    pub target: ResourceId,
    /// Action to run on the target
    pub action: String,
}

/// A guard predicate, evaluated immediately before a resource's action.
///
/// Evaluation is delegated to the run's
/// [`GuardEvaluator`](crate::context::GuardEvaluator); the core never spawns
/// processes itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardTest {
    /// A shell command; exit status zero counts as true
    Command(String),
}

/// A declarative unit of desired system state.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Identity `(type, name)`
    pub id: ResourceId,
    /// Desired-state parameters, interpreted by the provider
    pub params: Map<String, Value>,
    /// Declared actions; only the first (or a notification's explicit
    /// override) is executed
    pub actions: Vec<String>,
    /// Run only when this predicate is true
    pub only_if: Option<GuardTest>,
    /// Skip when this predicate is true
    pub not_if: Option<GuardTest>,
    /// Record a provider failure in the report and continue, instead of
    /// aborting the run
    pub ignore_failure: bool,
    /// Outgoing notification edges
    pub notifications: Vec<Notification>,
    /// Set after execution when the provider mutated the system
    pub updated: bool,
    /// Recipe that declared this resource (provenance for reports)
    pub recipe: String,
}

impl Resource {
    /// Declare a resource with one action.
    pub fn new(
        type_tag: impl Into<String>,
        name: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: ResourceId::new(type_tag, name),
            params: Map::new(),
            actions: vec![action.into()],
            only_if: None,
            not_if: None,
            ignore_failure: false,
            notifications: Vec::new(),
            updated: false,
            recipe: String::new(),
        }
    }

    /// Set a desired-state parameter (builder style).
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Add a notification edge (builder style).
    pub fn notifies(
        mut self,
        timing: NotifyTiming,
        target: ResourceId,
        action: impl Into<String>,
    ) -> Self {
        self.notifications.push(Notification {
            timing,
            target,
            action: action.into(),
        });
        self
    }

    /// Set the `only_if` guard (builder style).
    pub fn only_if(mut self, test: GuardTest) -> Self {
        self.only_if = Some(test);
        self
    }

    /// Set the `not_if` guard (builder style).
    pub fn not_if(mut self, test: GuardTest) -> Self {
        self.not_if = Some(test);
        self
    }

    /// Tolerate provider failures on this resource (builder style).
    pub fn ignore_failure(mut self) -> Self {
        self.ignore_failure = true;
        self
    }

    /// The action executed during a normal (non-notified) pass.
    pub fn primary_action(&self) -> &str {
        self.actions.first().map(String::as_str).unwrap_or("create")
    }

    /// Fetch a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_display() {
        assert_eq!(ResourceId::new("package", "nginx").to_string(), "package[nginx]");
    }

    #[test]
    fn primary_action_is_first_declared() {
        let mut r = Resource::new("service", "nginx", "enable");
        r.actions.push("start".to_string());
        assert_eq!(r.primary_action(), "enable");
    }

    #[test]
    fn builder_wires_notifications_and_guards() {
        let r = Resource::new("template", "nginx.conf", "create")
            .with_param("path", json!("/etc/nginx/nginx.conf"))
            .not_if(GuardTest::Command("test -f /etc/nginx/frozen".into()))
            .notifies(
                NotifyTiming::Delayed,
                ResourceId::new("service", "nginx"),
                "restart",
            );

        assert_eq!(r.param_str("path"), Some("/etc/nginx/nginx.conf"));
        assert!(r.not_if.is_some());
        assert_eq!(r.notifications.len(), 1);
        assert_eq!(r.notifications[0].action, "restart");
    }
}
