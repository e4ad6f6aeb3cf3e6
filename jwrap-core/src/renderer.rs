//! Virtual property rendering
//!
//! A virtual property is gated like an ordinary field (its own name against
//! the active filter, its effective views against the active view) and then
//! re-applies each member's own rules when it builds the nested object.

use crate::resolver::Group;
use jwrap_model::{FieldWriter, RenderContext, WriteError};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;

/// Renders the nested object of a [`Group`]
pub struct VirtualGroupRenderer;

impl VirtualGroupRenderer {
    /// Render `group` for `record`
    ///
    /// Returns `Ok(None)` when the group is gated out or when no member
    /// produced a value; an empty nested object is never returned. Member
    /// writer failures are returned unchanged.
    pub fn render<R: ?Sized>(
        group: &Group<R>,
        record: &R,
        ctx: &RenderContext,
    ) -> Result<Option<Map<String, Value>>, WriteError> {
        if ctx.excludes(group.name()) {
            trace!(group = group.name(), "virtual property excluded by filter");
            return Ok(None);
        }
        if !ctx.admits(group.effective_views()) {
            trace!(group = group.name(), "virtual property not in active view");
            return Ok(None);
        }

        let mut nested = Map::new();
        for member in group.members() {
            if !ctx.admits(member.views()) {
                trace!(
                    group = group.name(),
                    member = member.name(),
                    "member not in active view"
                );
                continue;
            }
            // Filters are not group-scoped: a member keeps its original name.
            if member.is_filter_participant() && ctx.excludes(member.name()) {
                trace!(
                    group = group.name(),
                    member = member.name(),
                    "member excluded by filter"
                );
                continue;
            }
            if let Some(value) = member.write(record, ctx)? {
                nested.insert(member.name().to_string(), value);
            }
        }

        if let Some(catch_all) = group.catch_all() {
            for (key, value) in catch_all.entries(record, ctx)? {
                if !nested.contains_key(&key) {
                    nested.insert(key, value);
                }
            }
        }

        if nested.is_empty() {
            trace!(group = group.name(), "virtual property has no visible members");
            return Ok(None);
        }
        Ok(Some(nested))
    }
}

/// Writer of the synthetic top-level field standing for a group
pub struct GroupWriter<R: ?Sized> {
    group: Arc<Group<R>>,
}

impl<R: ?Sized> GroupWriter<R> {
    /// Writer delegating to [`VirtualGroupRenderer`] over `group`
    pub fn new(group: Arc<Group<R>>) -> Self {
        Self { group }
    }

    /// The rendered group
    pub fn group(&self) -> &Arc<Group<R>> {
        &self.group
    }
}

impl<R: ?Sized> FieldWriter<R> for GroupWriter<R> {
    fn write(&self, record: &R, ctx: &RenderContext) -> Result<Option<Value>, WriteError> {
        Ok(VirtualGroupRenderer::render(&self.group, record, ctx)?.map(Value::Object))
    }
}
