//! Record serializer
//!
//! Renders [`Describe`] records to JSON using cached layouts, the configured
//! active view and the filter provider. Nested records re-enter the same
//! pipeline through [`nested`] fields.

use crate::cache::LayoutCache;
use jwrap_model::{
    Describe, FieldDescriptor, FieldWriter, FilterProvider, RenderContext, Result, ViewTag,
    WriteError,
};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Arc;

/// Serialization options
#[derive(Debug, Clone, Default)]
pub struct SerializerOptions {
    /// Active view; `None` renders every field regardless of views
    pub view: Option<ViewTag>,
    /// Filters looked up by record filter id
    pub filters: Arc<FilterProvider>,
}

/// Serializes records with virtual property grouping applied
#[derive(Debug, Clone, Default)]
pub struct RecordSerializer {
    options: SerializerOptions,
}

impl RecordSerializer {
    /// Create a serializer with the given options
    pub fn new(options: SerializerOptions) -> Self {
        Self { options }
    }

    /// Copy of this serializer rendering under `view`
    pub fn with_view(&self, view: ViewTag) -> Self {
        let mut options = self.options.clone();
        options.view = Some(view);
        Self { options }
    }

    /// Copy of this serializer using `filters`
    pub fn with_filters(&self, filters: FilterProvider) -> Self {
        let mut options = self.options.clone();
        options.filters = Arc::new(filters);
        Self { options }
    }

    /// Current options
    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// Base render context for a serialization call
    pub fn context(&self) -> RenderContext {
        let ctx = RenderContext::new().with_filter_provider(self.options.filters.clone());
        match &self.options.view {
            Some(view) => ctx.with_view(view.clone()),
            None => ctx,
        }
    }

    /// Render `record` as a JSON object
    pub fn to_map<R: Describe>(&self, record: &R) -> Result<Map<String, Value>> {
        let layout = LayoutCache::global().get_or_resolve::<R>()?;
        let ctx = self.context().for_record(layout.filter_id())?;
        Ok(layout.render(record, &ctx)?)
    }

    /// Render `record` as a JSON value
    pub fn to_value<R: Describe>(&self, record: &R) -> Result<Value> {
        self.to_map(record).map(Value::Object)
    }

    /// Render `record` as a compact JSON string
    pub fn to_string<R: Describe>(&self, record: &R) -> Result<String> {
        Ok(serde_json::to_string(&self.to_map(record)?)?)
    }

    /// Render `record` as compact JSON into `writer`
    pub fn to_writer<R: Describe, W: Write>(&self, writer: W, record: &R) -> Result<()> {
        Ok(serde_json::to_writer(writer, &self.to_map(record)?)?)
    }

    /// Adapter serializing `record` through any serde serializer
    pub fn rendered<'a, R: Describe>(&'a self, record: &'a R) -> Rendered<'a, R> {
        Rendered {
            serializer: self,
            record,
        }
    }
}

/// A record paired with the serializer that renders it
pub struct Rendered<'a, R> {
    serializer: &'a RecordSerializer,
    record: &'a R,
}

impl<R: Describe> Serialize for Rendered<'_, R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let object = self
            .serializer
            .to_map(self.record)
            .map_err(S::Error::custom)?;
        object.serialize(serializer)
    }
}

/// Writer for a field whose value is itself a [`Describe`] record
pub struct NestedWriter<R: ?Sized, T> {
    name: String,
    accessor: fn(&R) -> Option<&T>,
}

impl<R: ?Sized, T: Describe> NestedWriter<R, T> {
    /// Writer rendering the record returned by `accessor`
    pub fn new(name: impl Into<String>, accessor: fn(&R) -> Option<&T>) -> Self {
        Self {
            name: name.into(),
            accessor,
        }
    }
}

impl<R: ?Sized, T: Describe> FieldWriter<R> for NestedWriter<R, T> {
    fn write(&self, record: &R, ctx: &RenderContext) -> std::result::Result<Option<Value>, WriteError> {
        let Some(child) = (self.accessor)(record) else {
            return Ok(None);
        };
        let layout = LayoutCache::global()
            .get_or_resolve::<T>()
            .map_err(|e| WriteError::new(self.name.as_str(), e))?;
        let child_ctx = ctx
            .for_record(layout.filter_id())
            .map_err(|e| WriteError::new(self.name.as_str(), e))?;
        Ok(Some(Value::Object(layout.render(child, &child_ctx)?)))
    }
}

/// Field descriptor for a nested [`Describe`] record
///
/// The nested record inherits the active view; its filter is looked up by
/// its own filter id.
pub fn nested<R, T>(name: impl Into<String>, accessor: fn(&R) -> Option<&T>) -> FieldDescriptor<R>
where
    R: ?Sized + 'static,
    T: Describe,
{
    let name = name.into();
    FieldDescriptor::new(name.clone(), Arc::new(NestedWriter::new(name, accessor)))
}
