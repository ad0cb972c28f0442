//! # Attrset
//!
//! Layered node attributes with precedence-aware deep merging.
//!
//! A node carries four attribute layers. Reads always go through the merged
//! view; writes target exactly one layer. Precedence is fixed:
//!
//! `automatic > override > normal > default`
//!
//! Attribute values are [`serde_json::Value`] trees: when two layers both
//! hold a mapping at the same key the mappings deep-merge, anything else is
//! replaced wholesale by the higher-precedence layer.
//!
//! ## Example
//!
//! ```
//! use attrset::{AttrLayers, Layer};
//! use serde_json::json;
//!
//! let mut attrs = AttrLayers::new();
//! attrs.set(Layer::Default, "nginx.port", json!(80)).unwrap();
//! attrs.set(Layer::Override, "nginx.port", json!(8080)).unwrap();
//!
//! assert_eq!(attrs.read("nginx.port"), Some(json!(8080)));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from attribute writes.
#[derive(Debug, Error)]
pub enum AttrError {
    /// An empty path was supplied to a write
    #[error("attribute path must not be empty")]
    EmptyPath,
}

/// Result type for attribute operations.
pub type Result<T> = std::result::Result<T, AttrError>;

/// A single attribute layer, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Cookbook-supplied defaults
    Default,
    /// Node-local persistent attributes
    Normal,
    /// Forced overrides
    Override,
    /// Discovered facts (platform, hostname, ...)
    Automatic,
}

impl Layer {
    /// All layers in ascending precedence order.
    pub const ASCENDING: [Layer; 4] = [
        Layer::Default,
        Layer::Normal,
        Layer::Override,
        Layer::Automatic,
    ];

    fn index(self) -> usize {
        match self {
            Layer::Default => 0,
            Layer::Normal => 1,
            Layer::Override => 2,
            Layer::Automatic => 3,
        }
    }
}

/// The four attribute layers of a node.
///
/// Purely in-memory: persistence of the layers (and of the merged view after
/// a run) belongs to the caller.
#[derive(Debug, Clone, Default)]
pub struct AttrLayers {
    layers: [Map<String, Value>; 4],
}

impl AttrLayers {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at a dotted `path` inside one layer.
    ///
    /// Intermediate segments are created as empty mappings; an intermediate
    /// that exists as a non-mapping is replaced by a mapping. A value already
    /// present at the exact path is overwritten.
    pub fn set(&mut self, layer: Layer, path: &str, value: Value) -> Result<()> {
        let mut segments = split_path(path);
        let last = segments.pop().ok_or(AttrError::EmptyPath)?;

        let mut node = &mut self.layers[layer.index()];
        for segment in segments {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            node = entry
                .as_object_mut()
                .unwrap_or_else(|| unreachable!("entry was just made an object"));
        }
        node.insert(last.to_string(), value);
        Ok(())
    }

    /// Deep-merge a mapping document into one layer.
    ///
    /// Follows the within-layer write rule: mappings merge recursively,
    /// scalars and sequences from `doc` win outright.
    pub fn merge(&mut self, layer: Layer, doc: &Map<String, Value>) {
        let target = &mut self.layers[layer.index()];
        let merged = merge_maps(target, doc);
        *target = merged;
    }

    /// Read the value visible at `path` through merged precedence.
    ///
    /// Returns `None` when no layer defines the path; absence is not an
    /// error. Mappings present in several layers are deep-merged.
    pub fn read(&self, path: &str) -> Option<Value> {
        let segments = split_path(path);
        if segments.is_empty() {
            return None;
        }

        let mut merged: Option<Value> = None;
        for layer in Layer::ASCENDING {
            if let Some(value) = value_at(&self.layers[layer.index()], &segments) {
                merged = Some(match merged {
                    Some(low) => deep_merge(&low, value),
                    None => value.clone(),
                });
            }
        }
        merged
    }

    /// Produce the single merged mapping, ascending precedence.
    pub fn merged_view(&self) -> Map<String, Value> {
        let mut view = Map::new();
        for layer in Layer::ASCENDING {
            view = merge_maps(&view, &self.layers[layer.index()]);
        }
        view
    }

    /// Borrow the raw contents of one layer.
    pub fn layer(&self, layer: Layer) -> &Map<String, Value> {
        &self.layers[layer.index()]
    }
}

/// Deep-merge two values: mapping-vs-mapping recurses, otherwise `high` wins.
pub fn deep_merge(low: &Value, high: &Value) -> Value {
    match (low, high) {
        (Value::Object(l), Value::Object(h)) => Value::Object(merge_maps(l, h)),
        (_, h) => h.clone(),
    }
}

fn merge_maps(low: &Map<String, Value>, high: &Map<String, Value>) -> Map<String, Value> {
    let mut out = low.clone();
    for (key, hv) in high {
        match out.get(key) {
            Some(lv) => {
                let merged = deep_merge(lv, hv);
                out.insert(key.clone(), merged);
            }
            None => {
                out.insert(key.clone(), hv.clone());
            }
        }
    }
    out
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn value_at<'a>(map: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = map.get(*first)?;
    for segment in rest {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_mappings() {
        let mut attrs = AttrLayers::new();
        attrs.set(Layer::Default, "a.b.c", json!(1)).unwrap();
        assert_eq!(attrs.read("a.b.c"), Some(json!(1)));
        assert_eq!(attrs.read("a.b"), Some(json!({ "c": 1 })));
    }

    #[test]
    fn set_rejects_empty_path() {
        let mut attrs = AttrLayers::new();
        assert!(attrs.set(Layer::Default, "", json!(1)).is_err());
    }

    #[test]
    fn later_writes_overwrite_within_a_layer() {
        let mut attrs = AttrLayers::new();
        attrs.set(Layer::Normal, "x", json!("old")).unwrap();
        attrs.set(Layer::Normal, "x", json!("new")).unwrap();
        assert_eq!(attrs.read("x"), Some(json!("new")));
    }

    #[test]
    fn precedence_ignores_write_order() {
        let mut attrs = AttrLayers::new();
        attrs.set(Layer::Automatic, "x", json!("auto")).unwrap();
        attrs.set(Layer::Default, "x", json!("default")).unwrap();
        assert_eq!(attrs.read("x"), Some(json!("auto")));

        let mut attrs = AttrLayers::new();
        attrs.set(Layer::Override, "y", json!("override")).unwrap();
        attrs.set(Layer::Normal, "y", json!("normal")).unwrap();
        assert_eq!(attrs.read("y"), Some(json!("override")));
    }

    #[test]
    fn mappings_deep_merge_across_layers() {
        let mut attrs = AttrLayers::new();
        attrs
            .set(Layer::Default, "nginx", json!({ "port": 80, "user": "www" }))
            .unwrap();
        attrs
            .set(Layer::Override, "nginx", json!({ "port": 8080 }))
            .unwrap();

        assert_eq!(
            attrs.read("nginx"),
            Some(json!({ "port": 8080, "user": "www" }))
        );
    }

    #[test]
    fn sequences_replace_wholesale() {
        let mut attrs = AttrLayers::new();
        attrs.set(Layer::Default, "list", json!([1, 2, 3])).unwrap();
        attrs.set(Layer::Override, "list", json!([9])).unwrap();
        assert_eq!(attrs.read("list"), Some(json!([9])));
    }

    #[test]
    fn absent_path_is_none_not_error() {
        let attrs = AttrLayers::new();
        assert_eq!(attrs.read("does.not.exist"), None);
    }

    #[test]
    fn merged_view_layers_ascending() {
        let mut attrs = AttrLayers::new();
        attrs.set(Layer::Default, "a.x", json!(1)).unwrap();
        attrs.set(Layer::Normal, "a.y", json!(2)).unwrap();
        attrs.set(Layer::Automatic, "a.x", json!(99)).unwrap();

        let view = attrs.merged_view();
        assert_eq!(view.get("a"), Some(&json!({ "x": 99, "y": 2 })));
    }

    #[test]
    fn merge_document_into_layer() {
        let mut attrs = AttrLayers::new();
        attrs.set(Layer::Default, "svc.port", json!(80)).unwrap();

        let doc = json!({ "svc": { "workers": 4 } });
        attrs.merge(Layer::Default, doc.as_object().unwrap());

        assert_eq!(attrs.read("svc.port"), Some(json!(80)));
        assert_eq!(attrs.read("svc.workers"), Some(json!(4)));
    }
}
