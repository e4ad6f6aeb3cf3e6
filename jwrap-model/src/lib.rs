//! jwrap Model - Core data model for virtual property grouping
//!
//! This crate provides the building blocks shared by the resolver and the
//! renderer, with no I/O dependencies. It includes:
//!
//! - Field descriptors and their writer capabilities
//! - Per-field group assignments and record-level group rules
//! - The catch-all field for dynamic key/value pairs
//! - View tags, view sets and the view hierarchy registry
//! - Named filters and the filter provider
//! - The render context passed through a serialization run
//! - Error types

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod descriptor;
pub mod error;
pub mod filter;
pub mod view;

// Re-export commonly used types
pub use context::RenderContext;
pub use descriptor::{
    CatchAllField, CatchAllWriter, Describe, FieldDescriptor, FieldWriter, GroupAssignment,
    GroupRule, RecordDescription,
};
pub use error::{ConfigError, JwrapError, Result, WriteError};
pub use filter::{FilterOutAllExcept, FilterPredicate, FilterProvider, SerializeAllExcept};
pub use view::{ViewRegistry, ViewSet, ViewTag};
