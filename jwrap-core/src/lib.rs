//! jwrap Core - Virtual property grouping engine
//!
//! This crate turns the flat field list of a record into a nested JSON
//! shape: fields assigned to a group are moved under a synthetic "virtual"
//! property, the rest stay at the top level. It provides:
//!
//! - [`GroupResolver`]: partitions fields into ungrouped fields and groups
//! - [`VirtualGroupRenderer`]: renders a group under the active view and filter
//! - [`LayoutCache`]: per-type memoization of resolved layouts
//! - [`RecordSerializer`]: renders [`Describe`] records to JSON
//! - [`LayoutConfig`]: TOML-defined layouts for plain JSON object records

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod dynamic;
pub mod renderer;
pub mod resolver;
pub mod serializer;

// Re-export commonly used types
pub use cache::LayoutCache;
pub use dynamic::{DynamicLayout, FieldConfig, JsonRecord, LayoutConfig, RuleConfig};
pub use jwrap_model::{
    CatchAllField, ConfigError, Describe, FieldDescriptor, FilterOutAllExcept, FilterPredicate,
    FilterProvider, GroupAssignment, GroupRule, JwrapError, RecordDescription, RenderContext,
    Result, SerializeAllExcept, ViewRegistry, ViewSet, ViewTag, WriteError,
};
pub use renderer::{GroupWriter, VirtualGroupRenderer};
pub use resolver::{Group, GroupResolver, ResolvedLayout};
pub use serializer::{nested, NestedWriter, RecordSerializer, Rendered, SerializerOptions};
