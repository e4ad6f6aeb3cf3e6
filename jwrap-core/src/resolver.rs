//! Group resolution
//!
//! Partitions the flat field list of a record type into ungrouped fields and
//! virtual property groups, then appends one synthetic field per group to the
//! top-level field list. Resolution is pure and deterministic, so the result
//! can be memoized per record type (see [`crate::cache::LayoutCache`]).

use crate::renderer::GroupWriter;
use ahash::{AHashMap, AHashSet};
use jwrap_model::{
    CatchAllField, ConfigError, FieldDescriptor, GroupRule, RecordDescription, RenderContext,
    ViewSet, WriteError,
};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A virtual property and the fields moved into it
pub struct Group<R: ?Sized> {
    name: String,
    members: Vec<FieldDescriptor<R>>,
    catch_all: Option<CatchAllField<R>>,
    filter_participant: bool,
    effective_views: ViewSet,
}

impl<R: ?Sized> Group<R> {
    /// Name of the virtual property
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in discovery order (unconditional first, then filter-participant)
    pub fn members(&self) -> &[FieldDescriptor<R>] {
        &self.members
    }

    /// Catch-all field attached to this group
    pub fn catch_all(&self) -> Option<&CatchAllField<R>> {
        self.catch_all.as_ref()
    }

    /// True iff any member is filter-participant
    pub fn is_filter_participant(&self) -> bool {
        self.filter_participant
    }

    /// Views gating the virtual property as a whole
    pub fn effective_views(&self) -> &ViewSet {
        &self.effective_views
    }
}

impl<R: ?Sized> fmt::Debug for Group<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("members", &members)
            .field("has_catch_all", &self.catch_all.is_some())
            .field("filter_participant", &self.filter_participant)
            .field("effective_views", &self.effective_views)
            .finish()
    }
}

/// Accumulates a group during resolution
struct GroupBuilder<R: ?Sized> {
    name: String,
    members: Vec<FieldDescriptor<R>>,
    catch_all: Option<CatchAllField<R>>,
    filter_participant: bool,
    views: ViewSet,
    /// Set once an assignment declared its own views; member views are ignored from then on
    views_locked: bool,
    /// A member without views is visible in every view
    unrestricted_member: bool,
}

impl<R: ?Sized> GroupBuilder<R> {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
            catch_all: None,
            filter_participant: false,
            views: ViewSet::new(),
            views_locked: false,
            unrestricted_member: false,
        }
    }

    fn add_member(&mut self, field: FieldDescriptor<R>, assignment_views: &ViewSet) {
        if !assignment_views.is_empty() {
            if !self.views_locked {
                self.views_locked = true;
                self.views.clear();
            }
            self.views.extend(assignment_views.iter().cloned());
        }

        if !self.views_locked {
            if field.views().is_empty() {
                self.unrestricted_member = true;
            } else {
                self.views.extend(field.views().iter().cloned());
            }
        }

        self.filter_participant |= field.is_filter_participant();
        self.members.push(field);
    }

    fn finish(mut self) -> Group<R> {
        if !self.views_locked && self.unrestricted_member {
            self.views.clear();
        }
        Group {
            name: self.name,
            members: self.members,
            catch_all: self.catch_all,
            filter_participant: self.filter_participant,
            effective_views: self.views,
        }
    }
}

/// Regrouped field set of one record type
pub struct ResolvedLayout<R: ?Sized> {
    fields: Vec<FieldDescriptor<R>>,
    ungrouped_len: usize,
    groups: Vec<Arc<Group<R>>>,
    catch_all: Option<CatchAllField<R>>,
    filter_id: Option<String>,
}

impl<R: ?Sized> ResolvedLayout<R> {
    /// Top-level fields: ungrouped fields followed by one synthetic field per group
    pub fn fields(&self) -> &[FieldDescriptor<R>] {
        &self.fields
    }

    /// Fields that stayed at the top level, in original order
    pub fn ungrouped(&self) -> &[FieldDescriptor<R>] {
        &self.fields[..self.ungrouped_len]
    }

    /// Groups in order of their first declared member
    pub fn groups(&self) -> &[Arc<Group<R>>] {
        &self.groups
    }

    /// Look up a group by name
    pub fn group(&self, name: &str) -> Option<&Arc<Group<R>>> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// Catch-all field left at the top level
    pub fn catch_all(&self) -> Option<&CatchAllField<R>> {
        self.catch_all.as_ref()
    }

    /// Named filter applied to records of this type
    pub fn filter_id(&self) -> Option<&str> {
        self.filter_id.as_deref()
    }

    /// Render `record` as a JSON object under `ctx`
    ///
    /// `ctx` must already carry the filter for this record type (see
    /// [`RenderContext::for_record`]). Top-level catch-all entries are
    /// checked against the active filter and never replace a key that is
    /// already written.
    pub fn render(&self, record: &R, ctx: &RenderContext) -> Result<Map<String, Value>, WriteError> {
        let mut object = Map::new();
        for field in &self.fields {
            if !field.is_visible(ctx) {
                tracing::trace!(field = field.name(), "field suppressed at top level");
                continue;
            }
            if let Some(value) = field.write(record, ctx)? {
                object.insert(field.name().to_string(), value);
            }
        }
        if let Some(catch_all) = &self.catch_all {
            for (key, value) in catch_all.entries(record, ctx)? {
                if ctx.excludes(&key) {
                    tracing::trace!(key = key.as_str(), "catch-all entry excluded by filter");
                    continue;
                }
                // Declared fields and virtual properties keep their value.
                if object.contains_key(&key) {
                    tracing::trace!(key = key.as_str(), "catch-all entry shadowed by field");
                    continue;
                }
                object.insert(key, value);
            }
        }
        Ok(object)
    }
}

impl<R: ?Sized> fmt::Debug for ResolvedLayout<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields.iter().map(|f| f.name()).collect();
        f.debug_struct("ResolvedLayout")
            .field("fields", &fields)
            .field("groups", &self.groups)
            .field("has_catch_all", &self.catch_all.is_some())
            .field("filter_id", &self.filter_id)
            .finish()
    }
}

/// Group name and assignment views resolved for one field
type Assignment = Option<(String, ViewSet)>;

/// Builds [`ResolvedLayout`]s from record descriptions
pub struct GroupResolver;

impl GroupResolver {
    /// Resolve the grouped layout of a record type
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for duplicate field names, group rules naming
    /// unknown fields, group names colliding with ungrouped fields, and
    /// explicit property orders that name a virtual property.
    pub fn resolve<R: ?Sized + 'static>(
        description: RecordDescription<R>,
    ) -> Result<ResolvedLayout<R>, ConfigError> {
        let RecordDescription {
            fields,
            type_rule,
            catch_all,
            filter_id,
            property_order,
        } = description;

        check_unique_names(&fields)?;
        if let Some(rule) = &type_rule {
            check_rule_members(rule, &fields)?;
        }

        let assignments: Vec<Assignment> = fields
            .iter()
            .map(|field| assign(field, type_rule.as_ref()))
            .collect();

        let mut builders: Vec<GroupBuilder<R>> = Vec::new();
        let mut index: AHashMap<String, usize> = AHashMap::new();

        // Top-level group order follows each group's first field in declaration order.
        for (group, _) in assignments.iter().flatten() {
            builder_for(group, &mut builders, &mut index);
        }

        // Member order: unconditional members first, then filter-participant members.
        for filter_pass in [false, true] {
            collect_members(
                &fields,
                &assignments,
                filter_pass,
                &mut builders,
                &mut index,
            );
        }

        let mut ungrouped: Vec<FieldDescriptor<R>> = fields
            .iter()
            .zip(&assignments)
            .filter(|(_, assignment)| assignment.is_none())
            .map(|(field, _)| field.clone())
            .collect();

        let top_level_catch_all = match catch_all {
            Some(catch_all) => {
                let group = catch_all
                    .group()
                    .and_then(|g| g.name())
                    .map(str::to_string);
                match group {
                    Some(name) => {
                        builder_for(&name, &mut builders, &mut index).catch_all = Some(catch_all);
                        None
                    }
                    None => Some(catch_all),
                }
            }
            None => None,
        };

        for builder in &builders {
            if ungrouped.iter().any(|f| f.name() == builder.name) {
                return Err(ConfigError::GroupNameCollision {
                    group: builder.name.clone(),
                });
            }
            if property_order.iter().any(|name| name == &builder.name) {
                return Err(ConfigError::GroupNotOrderable {
                    group: builder.name.clone(),
                });
            }
        }

        let ungrouped_len = ungrouped.len();
        let groups: Vec<Arc<Group<R>>> = builders
            .into_iter()
            .map(|builder| Arc::new(builder.finish()))
            .collect();

        for group in &groups {
            let synthetic = FieldDescriptor::new(group.name(), Arc::new(GroupWriter::new(group.clone())))
                .with_views(group.effective_views().iter().cloned())
                .with_filter_participation(group.is_filter_participant());
            ungrouped.push(synthetic);
        }

        debug!(
            fields = ungrouped_len,
            groups = groups.len(),
            filter_id = filter_id.as_deref().unwrap_or(""),
            "resolved record layout"
        );

        Ok(ResolvedLayout {
            fields: ungrouped,
            ungrouped_len,
            groups,
            catch_all: top_level_catch_all,
            filter_id,
        })
    }
}

/// Per-field annotation first, then the record-level rule
fn assign<R: ?Sized>(field: &FieldDescriptor<R>, rule: Option<&GroupRule>) -> Assignment {
    if let Some(assignment) = field.group() {
        if let Some(name) = assignment.name() {
            return Some((name.to_string(), assignment.views().clone()));
        }
    }
    let rule = rule?;
    let name = rule.group_name()?;
    rule.covers(field.name())
        .then(|| (name.to_string(), rule.views().clone()))
}

fn collect_members<R: ?Sized>(
    fields: &[FieldDescriptor<R>],
    assignments: &[Assignment],
    filter_pass: bool,
    builders: &mut Vec<GroupBuilder<R>>,
    index: &mut AHashMap<String, usize>,
) {
    for (field, assignment) in fields.iter().zip(assignments) {
        if field.is_filter_participant() != filter_pass {
            continue;
        }
        if let Some((group, views)) = assignment {
            builder_for(group, builders, index).add_member(field.clone(), views);
        }
    }
}

fn builder_for<'a, R: ?Sized>(
    name: &str,
    builders: &'a mut Vec<GroupBuilder<R>>,
    index: &mut AHashMap<String, usize>,
) -> &'a mut GroupBuilder<R> {
    let position = *index.entry(name.to_string()).or_insert_with(|| {
        builders.push(GroupBuilder::new(name));
        builders.len() - 1
    });
    &mut builders[position]
}

fn check_unique_names<R: ?Sized>(fields: &[FieldDescriptor<R>]) -> Result<(), ConfigError> {
    let mut seen = AHashSet::with_capacity(fields.len());
    for field in fields {
        if !seen.insert(field.name()) {
            return Err(ConfigError::DuplicateField {
                name: field.name().to_string(),
            });
        }
    }
    Ok(())
}

fn check_rule_members<R: ?Sized>(
    rule: &GroupRule,
    fields: &[FieldDescriptor<R>],
) -> Result<(), ConfigError> {
    let Some(group) = rule.group_name() else {
        return Ok(());
    };
    for member in rule.member_names() {
        if !fields.iter().any(|f| f.name() == member) {
            return Err(ConfigError::UnknownRuleMember {
                group: group.to_string(),
                field: member.clone(),
            });
        }
    }
    Ok(())
}
