//! Named property filters
//!
//! A filter is a runtime predicate over field names. Records opt into
//! filtering by naming a filter id; the [`FilterProvider`] maps ids to
//! predicates for a serialization run.

use crate::error::ConfigError;
use ahash::{AHashMap, AHashSet};
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a field is suppressed by name
pub trait FilterPredicate: Send + Sync {
    /// Returns true if the field (or virtual property) named `name` must not be written
    fn excludes(&self, name: &str) -> bool;
}

impl<F> FilterPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn excludes(&self, name: &str) -> bool {
        self(name)
    }
}

/// Writes every field except the named ones
#[derive(Debug, Clone, Default)]
pub struct SerializeAllExcept {
    names: AHashSet<String>,
}

impl SerializeAllExcept {
    /// Create a filter excluding `names`
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl FilterPredicate for SerializeAllExcept {
    fn excludes(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Writes only the named fields
///
/// Virtual properties are fields in their own right: a group must be listed
/// here along with the members it should keep.
#[derive(Debug, Clone, Default)]
pub struct FilterOutAllExcept {
    names: AHashSet<String>,
}

impl FilterOutAllExcept {
    /// Create a filter keeping only `names`
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl FilterPredicate for FilterOutAllExcept {
    fn excludes(&self, name: &str) -> bool {
        !self.names.contains(name)
    }
}

/// Maps filter ids to predicates
#[derive(Clone, Default)]
pub struct FilterProvider {
    filters: AHashMap<String, Arc<dyn FilterPredicate>>,
    default_filter: Option<Arc<dyn FilterPredicate>>,
    fail_on_unknown_id: bool,
}

impl FilterProvider {
    /// Create an empty provider that tolerates unknown ids
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `filter` under `id`, replacing any previous registration
    pub fn add_filter(&mut self, id: impl Into<String>, filter: Arc<dyn FilterPredicate>) {
        self.filters.insert(id.into(), filter);
    }

    /// Builder form of [`FilterProvider::add_filter`]
    pub fn with_filter(mut self, id: impl Into<String>, filter: Arc<dyn FilterPredicate>) -> Self {
        self.add_filter(id, filter);
        self
    }

    /// Filter used for ids that have no registration
    pub fn with_default_filter(mut self, filter: Arc<dyn FilterPredicate>) -> Self {
        self.default_filter = Some(filter);
        self
    }

    /// Whether unknown ids (with no default filter) are an error
    pub fn with_fail_on_unknown_id(mut self, fail: bool) -> Self {
        self.fail_on_unknown_id = fail;
        self
    }

    /// Look up the filter registered for `id`
    pub fn get(&self, id: &str) -> Option<Arc<dyn FilterPredicate>> {
        self.filters.get(id).cloned()
    }

    /// Resolve the filter for `id`, falling back to the default filter
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownFilter`] when no filter matches and the
    /// provider is configured to fail on unknown ids.
    pub fn find(&self, id: &str) -> Result<Option<Arc<dyn FilterPredicate>>, ConfigError> {
        if let Some(filter) = self.get(id) {
            return Ok(Some(filter));
        }
        if let Some(default) = &self.default_filter {
            return Ok(Some(default.clone()));
        }
        if self.fail_on_unknown_id {
            return Err(ConfigError::UnknownFilter { id: id.to_string() });
        }
        Ok(None)
    }
}

impl fmt::Debug for FilterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.filters.keys().collect();
        ids.sort();
        f.debug_struct("FilterProvider")
            .field("ids", &ids)
            .field("has_default_filter", &self.default_filter.is_some())
            .field("fail_on_unknown_id", &self.fail_on_unknown_id)
            .finish()
    }
}
