//! Error types for jwrap

use thiserror::Error;

/// Errors raised while resolving the grouped layout of a record type.
///
/// These are fatal: nothing is cached for a type whose resolution failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Two fields of the same record share an output name
    #[error("Duplicate field '{name}': field names must be unique within a record")]
    DuplicateField {
        /// The repeated field name
        name: String,
    },

    /// The record-level group rule names a field the record does not have
    #[error(
        "Group rule for '{group}' names unknown field '{field}'.\n\
         \n\
         Rule members must use the field's output name (after renaming)."
    )]
    UnknownRuleMember {
        /// Group named by the rule
        group: String,
        /// Member name that matched no field
        field: String,
    },

    /// A group name is also used by a field that stays at the top level
    #[error(
        "Group name collision: virtual property '{group}' clashes with an ungrouped field of the same name"
    )]
    GroupNameCollision {
        /// The colliding name
        group: String,
    },

    /// An explicit property order names a virtual property
    #[error(
        "Virtual property '{group}' cannot be ordered explicitly.\n\
         \n\
         Virtual properties are always appended after the ungrouped fields;\n\
         remove '{group}' from the property order."
    )]
    GroupNotOrderable {
        /// Group named in the property order
        group: String,
    },

    /// The view hierarchy contains a cycle
    #[error("View hierarchy cycle detected at view '{name}'")]
    ViewCycle {
        /// View at which the cycle was detected
        name: String,
    },

    /// A record names a filter id unknown to the filter provider
    #[error("No filter configured with id '{id}'")]
    UnknownFilter {
        /// The filter id requested by the record
        id: String,
    },

    /// A layout definition is malformed
    #[error("Invalid layout: {reason}")]
    InvalidLayout {
        /// Explanation of why the layout is invalid
        reason: String,
    },
}

/// Failure of a field writer.
///
/// Raised by writer capabilities and propagated unchanged through the
/// renderer; it aborts serialization of the enclosing record.
#[derive(Debug, Error)]
#[error("Failed to write field '{field}': {source}")]
pub struct WriteError {
    field: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl WriteError {
    /// Wrap an underlying error raised while writing `field`
    pub fn new(
        field: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            field: field.into(),
            source: source.into(),
        }
    }

    /// Name of the field whose writer failed
    pub fn field(&self) -> &str {
        &self.field
    }
}

/// jwrap error types
#[derive(Debug, Error)]
pub enum JwrapError {
    /// Layout resolution failed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A field writer failed
    #[error(transparent)]
    Write(#[from] WriteError),
    /// Layout file could not be parsed
    #[error("Layout parse error: {0}")]
    LayoutParse(String),
    /// JSON parsing or serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// I/O operation failed while reading or writing data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, JwrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_keeps_field_and_source() {
        let err = WriteError::new("y", "boom");
        assert_eq!(err.field(), "y");
        assert_eq!(err.to_string(), "Failed to write field 'y': boom");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn write_error_is_transparent_in_umbrella() {
        let err: JwrapError = WriteError::new("y", "boom").into();
        assert_eq!(err.to_string(), "Failed to write field 'y': boom");
    }

    #[test]
    fn io_error_converts_into_umbrella() {
        fn fail() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        let err = fail().unwrap_err();
        assert!(matches!(err, JwrapError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: gone");
    }

    #[test]
    fn config_error_names_offending_group() {
        let err = ConfigError::GroupNotOrderable {
            group: "wrapped".to_string(),
        };
        assert!(err.to_string().contains("'wrapped'"));
    }
}
