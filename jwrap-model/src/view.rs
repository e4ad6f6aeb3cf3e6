//! View tags and view hierarchy
//!
//! A view is a named visibility context. Views form a hierarchy: a view may
//! extend any number of parent views, and an active view is compatible with
//! a declared view when it is that view or transitively extends it.

use crate::error::ConfigError;
use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A named view, possibly extending parent views
///
/// Two tags are equal when they share a node, or when they have the same
/// name and equal parents. A view with the same name but a different
/// hierarchy is a different view. Tags from one [`ViewRegistry`] share
/// nodes, so comparing them is a pointer check.
#[derive(Clone)]
pub struct ViewTag(Arc<ViewNode>);

struct ViewNode {
    name: String,
    parents: SmallVec<[ViewTag; 2]>,
}

impl ViewTag {
    /// Create a root view
    pub fn new(name: impl Into<String>) -> Self {
        Self::extending(name, std::iter::empty())
    }

    /// Create a view extending the given parents
    pub fn extending(name: impl Into<String>, parents: impl IntoIterator<Item = ViewTag>) -> Self {
        ViewTag(Arc::new(ViewNode {
            name: name.into(),
            parents: parents.into_iter().collect(),
        }))
    }

    /// View name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Direct parents of this view
    pub fn parents(&self) -> impl Iterator<Item = &ViewTag> {
        self.0.parents.iter()
    }

    /// Whether this view, used as the active view, activates fields declared
    /// with `declared`
    pub fn is_compatible_with(&self, declared: &ViewTag) -> bool {
        self == declared || self.0.parents.iter().any(|p| p.is_compatible_with(declared))
    }
}

impl PartialEq for ViewTag {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.name == other.0.name && self.0.parents == other.0.parents)
    }
}

impl Eq for ViewTag {}

// Equal tags always share a name.
impl Hash for ViewTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Debug for ViewTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ViewTag").field(&self.0.name).finish()
    }
}

impl fmt::Display for ViewTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Set of views declared on a field or group
///
/// An empty set means the field is active regardless of the active view.
#[derive(Clone, Default)]
pub struct ViewSet(SmallVec<[ViewTag; 2]>);

impl ViewSet {
    /// Create an empty (unrestricted) view set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a view; returns false if it was already present
    pub fn insert(&mut self, view: ViewTag) -> bool {
        if self.0.contains(&view) {
            return false;
        }
        self.0.push(view);
        true
    }

    /// Remove all views
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Whether the set declares no views
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of views
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether `view` is a member of the set
    pub fn contains(&self, view: &ViewTag) -> bool {
        self.0.contains(view)
    }

    /// Iterate the views in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ViewTag> {
        self.0.iter()
    }

    /// Whether a field declaring this set is active under `active`
    ///
    /// True when the set is empty, no view is active, or the active view is
    /// compatible with at least one declared view.
    pub fn admits(&self, active: Option<&ViewTag>) -> bool {
        match active {
            None => true,
            Some(_) if self.is_empty() => true,
            Some(active) => self.0.iter().any(|declared| active.is_compatible_with(declared)),
        }
    }
}

impl Extend<ViewTag> for ViewSet {
    fn extend<I: IntoIterator<Item = ViewTag>>(&mut self, iter: I) {
        for view in iter {
            self.insert(view);
        }
    }
}

impl FromIterator<ViewTag> for ViewSet {
    fn from_iter<I: IntoIterator<Item = ViewTag>>(iter: I) -> Self {
        let mut set = ViewSet::new();
        set.extend(iter);
        set
    }
}

impl PartialEq for ViewSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.0.iter().all(|v| other.contains(v))
    }
}

impl Eq for ViewSet {}

impl fmt::Debug for ViewSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter().map(|v| v.name())).finish()
    }
}

/// Interning registry of views by name
#[derive(Debug, Default, Clone)]
pub struct ViewRegistry {
    views: AHashMap<String, ViewTag>,
}

impl ViewRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a `view -> parents` mapping
    ///
    /// Parents that are not keys of the mapping become root views.
    pub fn from_hierarchy(hierarchy: &BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        let mut in_progress = AHashSet::new();
        for name in hierarchy.keys() {
            registry.define_recursive(name, hierarchy, &mut in_progress)?;
        }
        Ok(registry)
    }

    fn define_recursive(
        &mut self,
        name: &str,
        hierarchy: &BTreeMap<String, Vec<String>>,
        in_progress: &mut AHashSet<String>,
    ) -> Result<ViewTag, ConfigError> {
        if let Some(tag) = self.views.get(name) {
            return Ok(tag.clone());
        }
        if !in_progress.insert(name.to_string()) {
            return Err(ConfigError::ViewCycle {
                name: name.to_string(),
            });
        }

        let mut parents = SmallVec::<[ViewTag; 2]>::new();
        if let Some(parent_names) = hierarchy.get(name) {
            for parent in parent_names {
                parents.push(self.define_recursive(parent, hierarchy, in_progress)?);
            }
        }

        in_progress.remove(name);
        let tag = ViewTag::extending(name, parents);
        self.views.insert(name.to_string(), tag.clone());
        Ok(tag)
    }

    /// Look up a view by name
    pub fn get(&self, name: &str) -> Option<ViewTag> {
        self.views.get(name).cloned()
    }

    /// Look up a view by name, registering it as a root view if unknown
    pub fn tag(&mut self, name: &str) -> ViewTag {
        self.views
            .entry(name.to_string())
            .or_insert_with(|| ViewTag::new(name))
            .clone()
    }

    /// Resolve a list of view names into a view set
    pub fn view_set<S: AsRef<str>>(&mut self, names: &[S]) -> ViewSet {
        names.iter().map(|n| self.tag(n.as_ref())).collect()
    }
}
