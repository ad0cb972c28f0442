//! Recipe expansion into the resource collection.
//!
//! Compilation walks the run list in order, fetches each recipe's ordered
//! declarations through a [`RecipeSource`], and appends them to one
//! collection. A recipe's resources always appear as one contiguous block;
//! notification edges are registered as encountered and their targets
//! checked only once the whole run list has been expanded, so forward
//! references are legal.
//!
//! Cookbook default attributes are merged into the node's `default` layer
//! first (in run-list order), so every recipe compiles against the full
//! merged attribute view.

use crate::collection::ResourceCollection;
use crate::context::Node;
use crate::error::CompileError;
use crate::resource::Resource;
use anyhow::Result;
use attrset::Layer;
use cookbook::{RunList, Version};
use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Supplies recipe content for resolved cookbook versions.
///
/// The remote API service, a local cookbook path, or a test fixture all sit
/// behind this trait; the compiler does not care where bytes come from.
pub trait RecipeSource {
    /// The ordered resource declarations of one recipe.
    fn recipe(&self, cookbook: &str, version: &Version, recipe: &str) -> Result<Vec<Resource>>;

    /// The cookbook's default-layer attribute document, if it ships one.
    fn default_attributes(
        &self,
        cookbook: &str,
        version: &Version,
    ) -> Result<Option<Map<String, Value>>> {
        let _ = (cookbook, version);
        Ok(None)
    }
}

/// Expand the run list into the ordered resource collection.
pub fn compile(
    run_list: &RunList,
    resolved: &BTreeMap<String, Version>,
    source: &dyn RecipeSource,
    node: &mut Node,
) -> Result<ResourceCollection, CompileError> {
    // Attribute phase: cookbook defaults land before any recipe expands.
    for name in run_list.cookbooks() {
        let version = resolved_version(resolved, name)?;
        let attrs = source
            .default_attributes(name, version)
            .map_err(|source| CompileError::Source {
                recipe: format!("{name} (attributes)"),
                source,
            })?;
        if let Some(doc) = attrs {
            debug!("merging default attributes from cookbook '{name}'");
            node.attrs.merge(Layer::Default, &doc);
        }
    }

    let mut collection = ResourceCollection::new();

    for item in &run_list.items {
        let version = resolved_version(resolved, &item.cookbook)?;
        let qualified = item.qualified_recipe();
        let declarations = source
            .recipe(&item.cookbook, version, &item.recipe)
            .map_err(|source| CompileError::Source {
                recipe: qualified.clone(),
                source,
            })?;

        debug!(
            "expanding recipe '{qualified}' ({} resources)",
            declarations.len()
        );

        for mut resource in declarations {
            resource.recipe = qualified.clone();
            resource.params = interpolate_map(&resource.params, node, &resource.id.to_string())?;
            collection.append(resource)?;
        }
    }

    // Edges resolve lazily by identity; only a target that never appeared
    // anywhere in the run is an error.
    for resource in collection.iter() {
        for notification in &resource.notifications {
            if collection.position(&notification.target).is_none() {
                return Err(CompileError::UnknownNotifyTarget {
                    from: resource.id.to_string(),
                    target: notification.target.to_string(),
                });
            }
        }
    }

    Ok(collection)
}

fn resolved_version<'a>(
    resolved: &'a BTreeMap<String, Version>,
    name: &str,
) -> Result<&'a Version, CompileError> {
    resolved
        .get(name)
        .ok_or_else(|| CompileError::UnresolvedCookbook {
            name: name.to_string(),
        })
}

/// Substitute `{{dotted.path}}` placeholders in string parameters from the
/// node's merged attribute view.
///
/// A string that is exactly one placeholder takes the attribute's value
/// with its type intact; placeholders embedded in a longer string splice in
/// the scalar's text form. Referencing an attribute no layer defines is a
/// compile error.
fn interpolate_map(
    params: &Map<String, Value>,
    node: &Node,
    resource: &str,
) -> Result<Map<String, Value>, CompileError> {
    let mut out = Map::new();
    for (key, value) in params {
        out.insert(key.clone(), interpolate_value(value, node, resource)?);
    }
    Ok(out)
}

fn interpolate_value(
    value: &Value,
    node: &Node,
    resource: &str,
) -> Result<Value, CompileError> {
    match value {
        Value::String(s) => interpolate_str(s, node, resource),
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|v| interpolate_value(v, node, resource))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        }
        Value::Object(map) => Ok(Value::Object(interpolate_map(map, node, resource)?)),
        other => Ok(other.clone()),
    }
}

fn interpolate_str(input: &str, node: &Node, resource: &str) -> Result<Value, CompileError> {
    let lookup = |path: &str| -> Result<Value, CompileError> {
        node.attrs
            .read(path)
            .ok_or_else(|| CompileError::UndefinedAttribute {
                path: path.to_string(),
                resource: resource.to_string(),
            })
    };

    // Whole-string placeholder keeps the attribute's type.
    let trimmed = input.trim();
    if trimmed.starts_with("{{") && trimmed.ends_with("}}") && trimmed == input {
        let inner = &trimmed[2..trimmed.len() - 2];
        if !inner.contains("{{") && !inner.contains("}}") {
            return lookup(inner.trim());
        }
    }

    let mut out = String::new();
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start + 2..].find("}}") else {
            break; // unbalanced braces pass through verbatim
        };
        let end = start + 2 + end_rel;
        out.push_str(&rest[..start]);
        let path = rest[start + 2..end].trim();
        out.push_str(&scalar_text(&lookup(path)?));
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
