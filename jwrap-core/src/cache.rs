//! Per-type layout cache
//!
//! Resolved layouts are immutable and shared behind `Arc`. Lookups take a
//! read lock; a miss resolves the layout outside the lock and publishes it
//! with insert-if-absent, so a racing duplicate resolution is discarded and
//! every caller observes the first published layout.

use crate::resolver::{GroupResolver, ResolvedLayout};
use ahash::AHashMap;
use jwrap_model::{ConfigError, Describe};
use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

type ErasedLayout = Arc<dyn Any + Send + Sync>;

/// Cache of resolved layouts keyed by record type
#[derive(Default)]
pub struct LayoutCache {
    layouts: RwLock<AHashMap<TypeId, ErasedLayout>>,
}

impl LayoutCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache shared by serializers and nested record writers
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LayoutCache> = OnceLock::new();
        INSTANCE.get_or_init(LayoutCache::new)
    }

    /// Cached layout for `R`, if already resolved
    pub fn get<R: 'static>(&self) -> Option<Arc<ResolvedLayout<R>>> {
        let layouts = self.layouts.read().unwrap_or_else(PoisonError::into_inner);
        layouts
            .get(&TypeId::of::<R>())
            .cloned()
            .and_then(|erased| erased.downcast::<ResolvedLayout<R>>().ok())
    }

    /// Cached layout for `R`, resolving and publishing it on first use
    ///
    /// # Errors
    ///
    /// Returns the resolver's [`ConfigError`]; failed resolutions are not cached.
    pub fn get_or_resolve<R: Describe>(&self) -> Result<Arc<ResolvedLayout<R>>, ConfigError> {
        if let Some(layout) = self.get::<R>() {
            return Ok(layout);
        }

        let resolved: ErasedLayout = Arc::new(GroupResolver::resolve(R::describe())?);

        let published = {
            let mut layouts = self.layouts.write().unwrap_or_else(PoisonError::into_inner);
            layouts
                .entry(TypeId::of::<R>())
                .or_insert_with(|| {
                    debug!(record = std::any::type_name::<R>(), "published record layout");
                    resolved
                })
                .clone()
        };

        published
            .downcast::<ResolvedLayout<R>>()
            .map_err(|_| ConfigError::InvalidLayout {
                reason: format!(
                    "cached layout for {} has an unexpected type",
                    std::any::type_name::<R>()
                ),
            })
    }

    /// Number of cached record types
    pub fn len(&self) -> usize {
        self.layouts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no layout is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached layout
    pub fn clear(&self) {
        self.layouts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jwrap_model::{FieldDescriptor, GroupRule, RecordDescription};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    static DESCRIBE_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Describe for Counted {
        fn describe() -> RecordDescription<Self> {
            DESCRIBE_CALLS.fetch_add(1, Ordering::SeqCst);
            RecordDescription::new()
                .field(FieldDescriptor::getter("x", |_: &Counted| 42))
                .field(FieldDescriptor::getter("y", |_: &Counted| 4711).grouped("wrapped"))
        }
    }

    struct Plain;

    impl Describe for Plain {
        fn describe() -> RecordDescription<Self> {
            RecordDescription::new()
                .field(FieldDescriptor::getter("x", |_: &Plain| 42))
                .field(FieldDescriptor::getter("y", |_: &Plain| 4711).grouped("wrapped"))
        }
    }

    struct Broken;

    impl Describe for Broken {
        fn describe() -> RecordDescription<Self> {
            RecordDescription::new()
                .field(FieldDescriptor::getter("x", |_: &Broken| 1))
                .rule(GroupRule::new("wrapped", ["missing"]))
        }
    }

    #[test]
    fn resolves_once_and_reuses() {
        let cache = LayoutCache::new();
        let first = cache.get_or_resolve::<Counted>().unwrap();
        let calls = DESCRIBE_CALLS.load(Ordering::SeqCst);
        let second = cache.get_or_resolve::<Counted>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(DESCRIBE_CALLS.load(Ordering::SeqCst), calls);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_resolution_is_not_cached() {
        let cache = LayoutCache::new();
        assert!(matches!(
            cache.get_or_resolve::<Broken>(),
            Err(ConfigError::UnknownRuleMember { .. })
        ));
        assert!(cache.is_empty());
        assert!(cache.get::<Broken>().is_none());
    }

    #[test]
    fn concurrent_readers_share_one_layout() {
        let cache = Arc::new(LayoutCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get_or_resolve::<Plain>().unwrap())
            })
            .collect();

        let layouts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for layout in &layouts[1..] {
            assert!(Arc::ptr_eq(&layouts[0], layout));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_forgets_layouts() {
        let cache = LayoutCache::new();
        cache.get_or_resolve::<Plain>().unwrap();
        cache.clear();
        assert!(cache.get::<Plain>().is_none());
    }
}
