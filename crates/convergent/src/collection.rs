//! The ordered resource collection.
//!
//! Resources execute in exactly the order they were appended; the identity
//! index exists only so notification edges can reference targets declared
//! earlier or later without reordering anything.

use crate::error::CompileError;
use crate::resource::{Resource, ResourceId};
use std::collections::HashMap;

/// The ordered sequence of resources for one run, plus an identity index.
#[derive(Debug, Default)]
pub struct ResourceCollection {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource, rejecting duplicate identities.
    pub fn append(&mut self, resource: Resource) -> Result<(), CompileError> {
        if let Some(&existing) = self.index.get(&resource.id) {
            return Err(CompileError::DuplicateResource {
                id: resource.id.to_string(),
                first_recipe: self.resources[existing].recipe.clone(),
            });
        }
        self.index.insert(resource.id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    /// Position of an identity, if declared.
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Borrow the resource at `idx`. Panics on out-of-range access, which
    /// is a bug in the engine, not a runtime condition.
    pub fn get(&self, idx: usize) -> &Resource {
        &self.resources[idx]
    }

    /// Mutably borrow the resource at `idx`.
    pub fn get_mut(&mut self, idx: usize) -> &mut Resource {
        &mut self.resources[idx]
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }
}
