//! On-disk cookbook layout.
//!
//! A cookbook directory tree looks like:
//!
//! ```text
//! cookbooks/
//!   web/
//!     metadata.toml        name, version, dependency constraints
//!     attributes.toml      default-layer attribute document (optional)
//!     recipes/
//!       default.toml       ordered [[resource]] declarations
//!       tuning.toml
//! ```
//!
//! [`LocalCookbookSource`] scans the tree once, builds the version catalog
//! for dependency resolution, and serves recipe content to the compiler
//! through the [`RecipeSource`] seam.

use anyhow::{Context, Result, bail};
use convergent::{GuardTest, NotifyTiming, RecipeSource, Resource, ResourceId};
use cookbook::{Catalog, CookbookVersion, Version, parse_constraint, parse_version};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// `metadata.toml` contents.
#[derive(Debug, Deserialize)]
struct MetadataDoc {
    name: String,
    version: String,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// One `[[resource]]` entry in a recipe file. Keys not listed here are the
/// resource's desired-state parameters.
#[derive(Debug, Deserialize)]
struct ResourceDecl {
    #[serde(rename = "type")]
    type_tag: String,
    name: String,
    #[serde(default)]
    action: Option<ActionSpec>,
    only_if: Option<String>,
    not_if: Option<String>,
    #[serde(default)]
    ignore_failure: bool,
    #[serde(default)]
    notifies: Vec<NotifyDecl>,
    #[serde(flatten)]
    params: Map<String, Value>,
}

/// `action = "start"` or `action = ["enable", "start"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActionSpec {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct NotifyDecl {
    /// Target identity written as `type[name]`
    target: String,
    action: String,
    #[serde(default = "NotifyDecl::default_timing")]
    timing: NotifyTiming,
}

impl NotifyDecl {
    fn default_timing() -> NotifyTiming {
        NotifyTiming::Delayed
    }
}

#[derive(Debug, Deserialize)]
struct RecipeDoc {
    #[serde(default, rename = "resource")]
    resources: Vec<ResourceDecl>,
}

/// A directory of cookbooks on the local filesystem.
///
/// Several versions of one cookbook may coexist as separate directories;
/// the resolver picks among them through the catalog.
#[derive(Debug)]
pub struct LocalCookbookSource {
    cookbooks: BTreeMap<String, BTreeMap<Version, PathBuf>>,
}

impl LocalCookbookSource {
    /// Scan `root` for cookbook directories (anything holding a
    /// `metadata.toml`). Entries without metadata are skipped, not errors.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut cookbooks: BTreeMap<String, BTreeMap<Version, PathBuf>> = BTreeMap::new();
        let entries = fs::read_dir(root)
            .with_context(|| format!("reading cookbook directory {}", root.display()))?;

        for entry in entries {
            let entry = entry?;
            let dir = entry.path();
            let metadata_path = dir.join("metadata.toml");
            if !dir.is_dir() || !metadata_path.is_file() {
                continue;
            }

            let metadata = read_metadata(&metadata_path)?;
            let version = parse_version(&metadata.version)
                .with_context(|| format!("in {}", metadata_path.display()))?;
            debug!("found cookbook '{}' {} at {}", metadata.name, version, dir.display());
            cookbooks
                .entry(metadata.name)
                .or_default()
                .insert(version, dir);
        }

        Ok(Self { cookbooks })
    }

    /// Build the version catalog for dependency resolution.
    pub fn catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::new();
        for (name, versions) in &self.cookbooks {
            for (version, dir) in versions {
                let metadata = read_metadata(&dir.join("metadata.toml"))?;
                let mut cookbook = CookbookVersion::new(name.clone(), version.clone());
                for (dep, constraint) in &metadata.dependencies {
                    let req = parse_constraint(constraint).with_context(|| {
                        format!("dependency '{dep}' of cookbook '{name}' ({version})")
                    })?;
                    cookbook = cookbook.with_dependency(dep.clone(), req);
                }
                catalog.add(cookbook);
            }
        }
        Ok(catalog)
    }

    fn cookbook_dir(&self, name: &str, version: &Version) -> Result<&Path> {
        let Some(versions) = self.cookbooks.get(name) else {
            bail!("cookbook '{name}' not found on disk");
        };
        match versions.get(version) {
            Some(dir) => Ok(dir),
            None => bail!(
                "cookbook '{name}' has no version {version} on disk (have: {})",
                versions
                    .keys()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl RecipeSource for LocalCookbookSource {
    fn recipe(&self, cookbook: &str, version: &Version, recipe: &str) -> Result<Vec<Resource>> {
        let dir = self.cookbook_dir(cookbook, version)?;
        let path = dir.join("recipes").join(format!("{recipe}.toml"));
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading recipe {}", path.display()))?;
        let doc: RecipeDoc = toml::from_str(&text)
            .with_context(|| format!("parsing recipe {}", path.display()))?;

        doc.resources.into_iter().map(build_resource).collect()
    }

    fn default_attributes(
        &self,
        cookbook: &str,
        version: &Version,
    ) -> Result<Option<Map<String, Value>>> {
        let dir = self.cookbook_dir(cookbook, version)?;
        let path = dir.join("attributes.toml");
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading attributes {}", path.display()))?;
        let doc: Map<String, Value> = toml::from_str(&text)
            .with_context(|| format!("parsing attributes {}", path.display()))?;
        Ok(Some(doc))
    }
}

fn read_metadata(path: &Path) -> Result<MetadataDoc> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading metadata {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing metadata {}", path.display()))
}

fn build_resource(decl: ResourceDecl) -> Result<Resource> {
    let actions = match decl.action {
        Some(ActionSpec::One(action)) => vec![action],
        Some(ActionSpec::Many(actions)) if !actions.is_empty() => actions,
        Some(ActionSpec::Many(_)) | None => {
            vec![default_action(&decl.type_tag).to_string()]
        }
    };

    let mut resource = Resource::new(&decl.type_tag, &decl.name, &actions[0]);
    resource.actions = actions;
    resource.params = decl.params;
    resource.ignore_failure = decl.ignore_failure;
    resource.only_if = decl.only_if.map(GuardTest::Command);
    resource.not_if = decl.not_if.map(GuardTest::Command);

    for notify in decl.notifies {
        let target = parse_resource_ref(&notify.target)
            .with_context(|| format!("in notification of {}", resource.id))?;
        resource = resource.notifies(notify.timing, target, notify.action);
    }
    Ok(resource)
}

/// Per-type action taken when a declaration names none.
fn default_action(type_tag: &str) -> &'static str {
    match type_tag {
        "execute" => "run",
        "package" => "install",
        "service" => "start",
        _ => "create",
    }
}

/// Parse a `type[name]` reference.
fn parse_resource_ref(input: &str) -> Result<ResourceId> {
    let trimmed = input.trim();
    let Some((type_tag, rest)) = trimmed.split_once('[') else {
        bail!("'{input}' is not a 'type[name]' resource reference");
    };
    let Some(name) = rest.strip_suffix(']') else {
        bail!("'{input}' is not a 'type[name]' resource reference");
    };
    if type_tag.is_empty() || name.is_empty() {
        bail!("'{input}' is not a 'type[name]' resource reference");
    }
    Ok(ResourceId::new(type_tag, name))
}
