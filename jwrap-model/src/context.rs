//! Render context passed through a serialization run

use crate::error::ConfigError;
use crate::filter::{FilterPredicate, FilterProvider};
use crate::view::{ViewSet, ViewTag};
use std::fmt;
use std::sync::Arc;

/// Active view and filter for one serialization call
///
/// The same context (and therefore the same filter instance) is used for a
/// record's top-level fields and for the members of its virtual properties.
#[derive(Clone, Default)]
pub struct RenderContext {
    active_view: Option<ViewTag>,
    active_filter: Option<Arc<dyn FilterPredicate>>,
    filters: Option<Arc<FilterProvider>>,
}

impl RenderContext {
    /// Context with no active view and no filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active view
    pub fn with_view(mut self, view: ViewTag) -> Self {
        self.active_view = Some(view);
        self
    }

    /// Set the active filter directly
    pub fn with_filter(mut self, filter: Arc<dyn FilterPredicate>) -> Self {
        self.active_filter = Some(filter);
        self
    }

    /// Attach the provider used to look up filters by record filter id
    pub fn with_filter_provider(mut self, provider: Arc<FilterProvider>) -> Self {
        self.filters = Some(provider);
        self
    }

    /// The active view, if any
    pub fn active_view(&self) -> Option<&ViewTag> {
        self.active_view.as_ref()
    }

    /// The active filter, if any
    pub fn active_filter(&self) -> Option<&Arc<dyn FilterPredicate>> {
        self.active_filter.as_ref()
    }

    /// The attached filter provider, if any
    pub fn filter_provider(&self) -> Option<&Arc<FilterProvider>> {
        self.filters.as_ref()
    }

    /// Whether the active filter suppresses `name`
    pub fn excludes(&self, name: &str) -> bool {
        self.active_filter
            .as_ref()
            .is_some_and(|filter| filter.excludes(name))
    }

    /// Whether `views` admit the active view
    pub fn admits(&self, views: &ViewSet) -> bool {
        views.admits(self.active_view.as_ref())
    }

    /// Derive the context for a record that declares `filter_id`
    ///
    /// With a provider attached the active filter is re-resolved from the
    /// id (records without an id are unfiltered). Without a provider the
    /// context is returned unchanged.
    pub fn for_record(&self, filter_id: Option<&str>) -> Result<RenderContext, ConfigError> {
        let Some(provider) = &self.filters else {
            return Ok(self.clone());
        };
        let active_filter = match filter_id {
            Some(id) => provider.find(id)?,
            None => None,
        };
        Ok(RenderContext {
            active_view: self.active_view.clone(),
            active_filter,
            filters: Some(provider.clone()),
        })
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("active_view", &self.active_view)
            .field("has_active_filter", &self.active_filter.is_some())
            .field("filters", &self.filters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SerializeAllExcept;

    #[test]
    fn empty_context_excludes_nothing() {
        let ctx = RenderContext::new();
        assert!(!ctx.excludes("x"));
        assert!(ctx.admits(&[ViewTag::new("V")].into_iter().collect()));
    }

    #[test]
    fn for_record_resolves_filter_by_id() {
        let provider = Arc::new(
            FilterProvider::new().with_filter("f", Arc::new(SerializeAllExcept::new(["x"]))),
        );
        let ctx = RenderContext::new().with_filter_provider(provider);

        assert!(ctx.for_record(Some("f")).unwrap().excludes("x"));
        assert!(!ctx.for_record(None).unwrap().excludes("x"));
    }

    #[test]
    fn for_record_without_provider_keeps_filter() {
        let ctx = RenderContext::new().with_filter(Arc::new(SerializeAllExcept::new(["x"])));
        assert!(ctx.for_record(None).unwrap().excludes("x"));
    }
}
