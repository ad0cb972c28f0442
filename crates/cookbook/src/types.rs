//! Cookbook metadata, run lists, and the version catalog.

use crate::error::{Error, Result};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Parse a cookbook version leniently.
///
/// Cookbook metadata commonly writes two-part versions ("2.9"); missing
/// components are padded with zeros before semver parsing.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let padded = match trimmed.chars().filter(|c| *c == '.').count() {
        0 => format!("{trimmed}.0.0"),
        1 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded).map_err(|source| Error::InvalidVersion {
        input: input.to_string(),
        source,
    })
}

/// Parse a version constraint such as `">=2.0, <3.0"`.
pub fn parse_constraint(input: &str) -> Result<VersionReq> {
    VersionReq::parse(input.trim()).map_err(|source| Error::InvalidConstraint {
        input: input.to_string(),
        source,
    })
}

/// One loaded cookbook at one version: name, version, and the constraints
/// it places on its dependencies. Immutable once loaded for a run.
#[derive(Debug, Clone)]
pub struct CookbookVersion {
    /// Cookbook name
    pub name: String,
    /// Semantic version
    pub version: Version,
    /// Dependency name -> allowed version range
    pub dependencies: BTreeMap<String, VersionReq>,
}

impl CookbookVersion {
    /// Create a cookbook with no dependencies.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            dependencies: BTreeMap::new(),
        }
    }

    /// Add a dependency constraint (builder style).
    pub fn with_dependency(mut self, name: impl Into<String>, req: VersionReq) -> Self {
        self.dependencies.insert(name.into(), req);
        self
    }

    /// "name (version)" label used in constraint provenance.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.version)
    }
}

/// One entry of a run list: a cookbook, a recipe within it, and an optional
/// version pin.
///
/// Accepted forms: `nginx`, `nginx::ssl`, `nginx@1.2`, `nginx::ssl@1.2.0`.
/// An unqualified entry names the cookbook's `default` recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunListItem {
    /// Cookbook name
    pub cookbook: String,
    /// Recipe within the cookbook
    pub recipe: String,
    /// Version pin, applied as an `=version` constraint
    pub pin: Option<VersionReq>,
}

impl RunListItem {
    /// The recipe's qualified name, e.g. `nginx::default`.
    pub fn qualified_recipe(&self) -> String {
        format!("{}::{}", self.cookbook, self.recipe)
    }
}

impl FromStr for RunListItem {
    type Err = Error;

    fn from_str(entry: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidRunListEntry {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (spec, pin) = match entry.split_once('@') {
            Some((spec, version)) => {
                if version.trim().is_empty() {
                    return Err(invalid("empty version pin"));
                }
                let req = parse_constraint(&format!("={}", version.trim()))?;
                (spec, Some(req))
            }
            None => (entry, None),
        };

        let (cookbook, recipe) = match spec.split_once("::") {
            Some((cookbook, recipe)) => (cookbook.trim(), recipe.trim()),
            None => (spec.trim(), "default"),
        };

        if cookbook.is_empty() {
            return Err(invalid("empty cookbook name"));
        }
        if recipe.is_empty() {
            return Err(invalid("empty recipe name"));
        }

        Ok(Self {
            cookbook: cookbook.to_string(),
            recipe: recipe.to_string(),
            pin,
        })
    }
}

impl TryFrom<String> for RunListItem {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RunListItem> for String {
    fn from(item: RunListItem) -> Self {
        item.to_string()
    }
}

impl fmt::Display for RunListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.cookbook, self.recipe)?;
        if let Some(pin) = &self.pin {
            // Pins always round-trip as "=x.y.z"; print the bare version.
            write!(f, "@{}", pin.to_string().trim_start_matches('='))?;
        }
        Ok(())
    }
}

/// The ordered sequence of recipes a node should converge to in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunList {
    /// Entries, in requested order
    pub items: Vec<RunListItem>,
}

impl RunList {
    /// Parse a run list from entry strings, preserving order.
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items = entries
            .into_iter()
            .map(|e| e.as_ref().parse())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    /// Cookbook names in first-appearance order, deduplicated.
    pub fn cookbooks(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for item in &self.items {
            if !seen.contains(&item.cookbook.as_str()) {
                seen.push(item.cookbook.as_str());
            }
        }
        seen
    }

    /// Whether the run list has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Display for RunList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.items.iter().map(ToString::to_string).collect();
        write!(f, "{}", entries.join(", "))
    }
}

/// All cookbook versions available to a run, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, BTreeMap<Version, CookbookVersion>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one cookbook version. A duplicate (name, version) replaces the
    /// earlier entry.
    pub fn add(&mut self, cookbook: CookbookVersion) {
        self.entries
            .entry(cookbook.name.clone())
            .or_default()
            .insert(cookbook.version.clone(), cookbook);
    }

    /// Whether any version of `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Fetch one exact version.
    pub fn get(&self, name: &str, version: &Version) -> Option<&CookbookVersion> {
        self.entries.get(name)?.get(version)
    }

    /// All versions of `name`, highest first.
    pub fn versions_desc(&self, name: &str) -> Vec<&CookbookVersion> {
        self.entries
            .get(name)
            .map(|versions| versions.values().rev().collect())
            .unwrap_or_default()
    }

    /// Number of distinct cookbook names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_pads_missing_components() {
        assert_eq!(parse_version("2.9").unwrap(), Version::new(2, 9, 0));
        assert_eq!(parse_version("3").unwrap(), Version::new(3, 0, 0));
        assert_eq!(parse_version("1.2.3").unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn parse_version_rejects_garbage() {
        assert!(parse_version("not-a-version").is_err());
    }

    #[test]
    fn run_list_item_forms() {
        let plain: RunListItem = "nginx".parse().unwrap();
        assert_eq!(plain.cookbook, "nginx");
        assert_eq!(plain.recipe, "default");
        assert!(plain.pin.is_none());

        let qualified: RunListItem = "nginx::ssl".parse().unwrap();
        assert_eq!(qualified.recipe, "ssl");

        let pinned: RunListItem = "nginx@1.2".parse().unwrap();
        let pin = pinned.pin.unwrap();
        assert!(pin.matches(&Version::new(1, 2, 0)));
        assert!(pin.matches(&Version::new(1, 2, 7)));
        assert!(!pin.matches(&Version::new(1, 3, 0)));
    }

    #[test]
    fn run_list_item_rejects_malformed() {
        assert!("".parse::<RunListItem>().is_err());
        assert!("nginx@".parse::<RunListItem>().is_err());
        assert!("::ssl".parse::<RunListItem>().is_err());
        assert!("nginx::".parse::<RunListItem>().is_err());
    }

    #[test]
    fn run_list_cookbooks_dedup_in_order() {
        let rl = RunList::parse(["base", "nginx::ssl", "base::users"]).unwrap();
        assert_eq!(rl.cookbooks(), vec!["base", "nginx"]);
    }

    #[test]
    fn catalog_versions_descend() {
        let mut catalog = Catalog::new();
        for v in ["1.0", "2.1", "1.9"] {
            catalog.add(CookbookVersion::new("x", parse_version(v).unwrap()));
        }
        let versions: Vec<String> = catalog
            .versions_desc("x")
            .iter()
            .map(|c| c.version.to_string())
            .collect();
        assert_eq!(versions, vec!["2.1.0", "1.9.0", "1.0.0"]);
    }
}
