//! Field descriptors and grouping metadata
//!
//! Introspection describes a record type as a flat list of
//! [`FieldDescriptor`]s, an optional record-level [`GroupRule`] and an
//! optional [`CatchAllField`]. These values are immutable once built and are
//! safe to cache for the lifetime of the type.

use crate::context::RenderContext;
use crate::error::WriteError;
use crate::view::{ViewSet, ViewTag};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Produces the value of one field of a record
///
/// `Ok(None)` means the field has nothing to emit for this record and is
/// skipped. Writers for nested records may re-enter the serializer with
/// `ctx`.
pub trait FieldWriter<R: ?Sized>: Send + Sync {
    /// Write the field value of `record`
    fn write(&self, record: &R, ctx: &RenderContext) -> Result<Option<Value>, WriteError>;
}

impl<R: ?Sized, F> FieldWriter<R> for F
where
    F: Fn(&R, &RenderContext) -> Result<Option<Value>, WriteError> + Send + Sync,
{
    fn write(&self, record: &R, ctx: &RenderContext) -> Result<Option<Value>, WriteError> {
        self(record, ctx)
    }
}

/// Produces the dynamic key/value pairs of a catch-all field
pub trait CatchAllWriter<R: ?Sized>: Send + Sync {
    /// Current entries of `record`, in emission order
    fn entries(&self, record: &R, ctx: &RenderContext) -> Result<Vec<(String, Value)>, WriteError>;
}

impl<R: ?Sized, F> CatchAllWriter<R> for F
where
    F: Fn(&R, &RenderContext) -> Result<Vec<(String, Value)>, WriteError> + Send + Sync,
{
    fn entries(&self, record: &R, ctx: &RenderContext) -> Result<Vec<(String, Value)>, WriteError> {
        self(record, ctx)
    }
}

/// Per-field group annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAssignment {
    name: String,
    views: ViewSet,
}

impl GroupAssignment {
    /// Assign a field to the virtual property `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            views: ViewSet::new(),
        }
    }

    /// Views of the virtual property itself
    ///
    /// When non-empty these replace the views collected from the members.
    pub fn with_views(mut self, views: impl IntoIterator<Item = ViewTag>) -> Self {
        self.views = views.into_iter().collect();
        self
    }

    /// Group name with surrounding whitespace removed; `None` when blank
    pub fn name(&self) -> Option<&str> {
        non_blank(&self.name)
    }

    /// Views declared on the assignment
    pub fn views(&self) -> &ViewSet {
        &self.views
    }
}

/// Record-level rule assigning named fields to one virtual property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRule {
    group_name: String,
    member_names: Vec<String>,
    views: ViewSet,
}

impl GroupRule {
    /// Assign the fields named `members` to the virtual property `group_name`
    pub fn new<I, S>(group_name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut member_names: Vec<String> = Vec::new();
        for member in members {
            let member = member.into();
            if !member_names.contains(&member) {
                member_names.push(member);
            }
        }
        Self {
            group_name: group_name.into(),
            member_names,
            views: ViewSet::new(),
        }
    }

    /// Views of the virtual property declared at record level
    pub fn with_views(mut self, views: impl IntoIterator<Item = ViewTag>) -> Self {
        self.views = views.into_iter().collect();
        self
    }

    /// Group name with surrounding whitespace removed; `None` when blank
    pub fn group_name(&self) -> Option<&str> {
        non_blank(&self.group_name)
    }

    /// Member field names, deduplicated, in declaration order
    pub fn member_names(&self) -> &[String] {
        &self.member_names
    }

    /// Views declared on the rule
    pub fn views(&self) -> &ViewSet {
        &self.views
    }

    /// Whether the rule assigns the field named `field`
    pub fn covers(&self, field: &str) -> bool {
        self.member_names.iter().any(|m| m == field)
    }
}

fn non_blank(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// One declared output field of a record type
pub struct FieldDescriptor<R: ?Sized> {
    name: String,
    writer: Arc<dyn FieldWriter<R>>,
    views: ViewSet,
    filter_participant: bool,
    group: Option<GroupAssignment>,
}

impl<R: ?Sized> FieldDescriptor<R> {
    /// Describe a field written by `writer`
    pub fn new(name: impl Into<String>, writer: Arc<dyn FieldWriter<R>>) -> Self {
        Self {
            name: name.into(),
            writer,
            views: ViewSet::new(),
            filter_participant: false,
            group: None,
        }
    }

    /// Describe a field whose value is read through `accessor`
    ///
    /// The accessor result is converted with `serde_json::to_value`.
    pub fn getter<V, F>(name: impl Into<String>, accessor: F) -> Self
    where
        R: 'static,
        V: Serialize,
        F: Fn(&R) -> V + Send + Sync + 'static,
    {
        let name = name.into();
        let field = name.clone();
        let writer = move |record: &R, _ctx: &RenderContext| {
            serde_json::to_value(accessor(record))
                .map(Some)
                .map_err(|e| WriteError::new(field.as_str(), e))
        };
        Self::new(name, Arc::new(writer))
    }

    /// Restrict the field to the given views
    pub fn with_views(mut self, views: impl IntoIterator<Item = ViewTag>) -> Self {
        self.views = views.into_iter().collect();
        self
    }

    /// Mark the field as subject to the active named filter
    pub fn filtered(mut self) -> Self {
        self.filter_participant = true;
        self
    }

    /// Set whether the field is subject to the active named filter
    pub fn with_filter_participation(mut self, participant: bool) -> Self {
        self.filter_participant = participant;
        self
    }

    /// Assign the field to the virtual property `group`
    pub fn grouped(self, group: impl Into<String>) -> Self {
        self.with_group(GroupAssignment::new(group))
    }

    /// Attach a group assignment
    pub fn with_group(mut self, group: GroupAssignment) -> Self {
        self.group = Some(group);
        self
    }

    /// Output name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writer capability
    pub fn writer(&self) -> &Arc<dyn FieldWriter<R>> {
        &self.writer
    }

    /// Declared views
    pub fn views(&self) -> &ViewSet {
        &self.views
    }

    /// Whether the field is re-checked against the active filter
    pub fn is_filter_participant(&self) -> bool {
        self.filter_participant
    }

    /// Per-field group annotation
    pub fn group(&self) -> Option<&GroupAssignment> {
        self.group.as_ref()
    }

    /// Write this field for `record`
    pub fn write(&self, record: &R, ctx: &RenderContext) -> Result<Option<Value>, WriteError> {
        self.writer.write(record, ctx)
    }

    /// Whether the field passes the view gate and, if it participates, the filter gate
    pub fn is_visible(&self, ctx: &RenderContext) -> bool {
        ctx.admits(&self.views) && !(self.filter_participant && ctx.excludes(&self.name))
    }
}

impl<R: ?Sized> Clone for FieldDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            writer: self.writer.clone(),
            views: self.views.clone(),
            filter_participant: self.filter_participant,
            group: self.group.clone(),
        }
    }
}

impl<R: ?Sized> fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("views", &self.views)
            .field("filter_participant", &self.filter_participant)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Dynamic "any remaining keys" field
///
/// Its keys are unknown until render time, so it is never expanded into
/// ordinary descriptors.
pub struct CatchAllField<R: ?Sized> {
    writer: Arc<dyn CatchAllWriter<R>>,
    group: Option<GroupAssignment>,
}

impl<R: ?Sized> CatchAllField<R> {
    /// Catch-all field producing entries through `writer`
    pub fn new(writer: Arc<dyn CatchAllWriter<R>>) -> Self {
        Self {
            writer,
            group: None,
        }
    }

    /// Move the catch-all entries into the virtual property `group`
    pub fn grouped(mut self, group: impl Into<String>) -> Self {
        self.group = Some(GroupAssignment::new(group));
        self
    }

    /// Group annotation of the catch-all
    pub fn group(&self) -> Option<&GroupAssignment> {
        self.group.as_ref()
    }

    /// Current entries of `record`
    pub fn entries(&self, record: &R, ctx: &RenderContext) -> Result<Vec<(String, Value)>, WriteError> {
        self.writer.entries(record, ctx)
    }
}

impl<R: ?Sized> Clone for CatchAllField<R> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
            group: self.group.clone(),
        }
    }
}

impl<R: ?Sized> fmt::Debug for CatchAllField<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatchAllField")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Everything introspection knows about a record type
pub struct RecordDescription<R: ?Sized> {
    /// Flat output fields in discovery order
    pub fields: Vec<FieldDescriptor<R>>,
    /// Record-level group rule
    pub type_rule: Option<GroupRule>,
    /// Dynamic catch-all field
    pub catch_all: Option<CatchAllField<R>>,
    /// Id of the named filter applied to this record
    pub filter_id: Option<String>,
    /// Explicit property order the fields were sorted by
    pub property_order: Vec<String>,
}

impl<R: ?Sized> RecordDescription<R> {
    /// Empty description
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            type_rule: None,
            catch_all: None,
            filter_id: None,
            property_order: Vec::new(),
        }
    }

    /// Append a field
    pub fn field(mut self, field: FieldDescriptor<R>) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the record-level group rule
    pub fn rule(mut self, rule: GroupRule) -> Self {
        self.type_rule = Some(rule);
        self
    }

    /// Set the catch-all field
    pub fn catch_all(mut self, catch_all: CatchAllField<R>) -> Self {
        self.catch_all = Some(catch_all);
        self
    }

    /// Apply the named filter `id` to this record
    ///
    /// Every field already added becomes filter-participant; add fields
    /// first, then call this.
    pub fn filtered_by(mut self, id: impl Into<String>) -> Self {
        self.filter_id = Some(id.into());
        self.fields = self.fields.into_iter().map(FieldDescriptor::filtered).collect();
        self
    }

    /// Record the explicit property order used by introspection
    pub fn property_order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_order = names.into_iter().map(Into::into).collect();
        self
    }
}

impl<R: ?Sized> Default for RecordDescription<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Introspection entry point for a record type
pub trait Describe: Sized + 'static {
    /// Describe the output fields of `Self`
    fn describe() -> RecordDescription<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Point {
        x: i32,
    }

    #[test]
    fn getter_writes_serialized_value() {
        let field = FieldDescriptor::getter("x", |p: &Point| p.x);
        let value = field.write(&Point { x: 42 }, &RenderContext::new()).unwrap();
        assert_eq!(value, Some(json!(42)));
    }

    #[test]
    fn blank_group_names_count_as_absent() {
        assert_eq!(GroupAssignment::new("  ").name(), None);
        assert_eq!(GroupAssignment::new(" wrapped ").name(), Some("wrapped"));
        assert_eq!(GroupRule::new("", ["x"]).group_name(), None);
    }

    #[test]
    fn rule_deduplicates_members() {
        let rule = GroupRule::new("wrapped", ["y", "z", "y"]);
        assert_eq!(rule.member_names(), ["y".to_string(), "z".to_string()]);
        assert!(rule.covers("z"));
        assert!(!rule.covers("x"));
    }

    #[test]
    fn filtered_by_marks_existing_fields() {
        let description = RecordDescription::new()
            .field(FieldDescriptor::getter("x", |p: &Point| p.x))
            .filtered_by("filter");
        assert_eq!(description.filter_id.as_deref(), Some("filter"));
        assert!(description.fields[0].is_filter_participant());
    }

    #[test]
    fn visibility_combines_view_and_filter() {
        use crate::filter::SerializeAllExcept;

        let view = ViewTag::new("V");
        let field = FieldDescriptor::getter("x", |p: &Point| p.x)
            .with_views([view.clone()])
            .filtered();

        assert!(field.is_visible(&RenderContext::new()));
        assert!(field.is_visible(&RenderContext::new().with_view(view.clone())));
        assert!(!field.is_visible(&RenderContext::new().with_view(ViewTag::new("Other"))));
        let filtered = RenderContext::new().with_filter(Arc::new(SerializeAllExcept::new(["x"])));
        assert!(!field.is_visible(&filtered));
    }
}
