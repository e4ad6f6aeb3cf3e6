//! Layout definitions for JSON object records
//!
//! A [`LayoutConfig`] describes the fields of plain JSON objects (for
//! example NDJSON lines) the way introspection describes a Rust type: field
//! names and renames, views, group assignments, a record-level group rule, a
//! filter id and a catch-all for undeclared keys. [`LayoutConfig::build`]
//! validates it into a [`DynamicLayout`] that renders records through the
//! same resolver and renderer as [`crate::RecordSerializer`].
//!
//! ```toml
//! filter = "f"
//! catch_all = true
//! catch_all_group = "extra"
//!
//! [views]
//! View = ["DefaultView"]
//!
//! [[fields]]
//! name = "x"
//!
//! [[fields]]
//! name = "y"
//! views = ["View"]
//! group = "wrapped"
//! ```

use crate::resolver::{GroupResolver, ResolvedLayout};
use ahash::AHashSet;
use jwrap_model::{
    CatchAllField, ConfigError, FieldDescriptor, GroupAssignment, GroupRule, JwrapError,
    RecordDescription, RenderContext, Result, ViewRegistry, ViewSet, ViewTag, WriteError,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A JSON object record
pub type JsonRecord = Map<String, Value>;

/// Layout of JSON object records
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutConfig {
    /// Filter id; fields participate in filtering unless they opt out
    #[serde(default)]
    pub filter: Option<String>,
    /// Collect undeclared input keys into a catch-all field
    #[serde(default)]
    pub catch_all: bool,
    /// Virtual property receiving the catch-all entries (implies `catch_all`)
    #[serde(default)]
    pub catch_all_group: Option<String>,
    /// Explicit property order; listed fields come first
    #[serde(default)]
    pub order: Vec<String>,
    /// View hierarchy: view name -> parent view names
    #[serde(default)]
    pub views: BTreeMap<String, Vec<String>>,
    /// Declared fields in output order
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    /// Record-level group rule
    #[serde(default)]
    pub rule: Option<RuleConfig>,
}

/// One declared field
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    /// Output name
    pub name: String,
    /// Input key, when it differs from the output name
    #[serde(default)]
    pub source: Option<String>,
    /// Views the field is restricted to
    #[serde(default)]
    pub views: Vec<String>,
    /// Virtual property the field moves into
    #[serde(default)]
    pub group: Option<String>,
    /// Views of the virtual property itself (override member views)
    #[serde(default)]
    pub group_views: Vec<String>,
    /// Override filter participation (defaults to whether `filter` is set)
    #[serde(default)]
    pub filtered: Option<bool>,
}

/// Record-level group rule
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Virtual property name
    pub group: String,
    /// Output names of the member fields
    pub members: Vec<String>,
    /// Views of the virtual property
    #[serde(default)]
    pub views: Vec<String>,
}

impl LayoutConfig {
    /// Parse a layout from TOML
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| JwrapError::LayoutParse(e.to_string()))
    }

    /// Validate the layout and resolve its groups
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateField`] for repeated field names and
    /// [`ConfigError::InvalidLayout`] for blank field names, order entries
    /// naming nothing, or an input key claimed by two fields, plus any error
    /// of the group resolver.
    pub fn build(&self) -> std::result::Result<DynamicLayout, ConfigError> {
        let mut registry = ViewRegistry::from_hierarchy(&self.views)?;
        let fields = self.ordered_fields()?;

        let mut sources: AHashSet<String> = AHashSet::new();
        let mut description = RecordDescription::<JsonRecord>::new();
        for field in fields {
            let source = field.source.clone().unwrap_or_else(|| field.name.clone());
            if !sources.insert(source.clone()) {
                return Err(invalid(format!(
                    "input key '{}' is used by more than one field",
                    source
                )));
            }

            let mut descriptor = FieldDescriptor::new(
                field.name.clone(),
                Arc::new(move |record: &JsonRecord, _ctx: &RenderContext| {
                    Ok::<_, WriteError>(record.get(&source).cloned())
                }),
            )
            .with_views(registry.view_set(&field.views).iter().cloned())
            .with_filter_participation(field.filtered.unwrap_or(self.filter.is_some()));

            if let Some(group) = &field.group {
                let assignment = GroupAssignment::new(group.clone())
                    .with_views(registry.view_set(&field.group_views).iter().cloned());
                descriptor = descriptor.with_group(assignment);
            }
            description = description.field(descriptor);
        }

        if let Some(rule) = &self.rule {
            let views = registry.view_set(&rule.views);
            let rule = GroupRule::new(rule.group.clone(), rule.members.clone())
                .with_views(views.iter().cloned());
            description = description.rule(rule);
        }

        if self.catch_all || self.catch_all_group.is_some() {
            let declared = sources.clone();
            let mut catch_all = CatchAllField::new(Arc::new(
                move |record: &JsonRecord, _ctx: &RenderContext| {
                    Ok::<_, WriteError>(
                        record
                            .iter()
                            .filter(|(key, _)| !declared.contains(key.as_str()))
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect::<Vec<_>>(),
                    )
                },
            ));
            if let Some(group) = &self.catch_all_group {
                catch_all = catch_all.grouped(group.clone());
            }
            description = description.catch_all(catch_all);
        }

        if let Some(filter) = &self.filter {
            description.filter_id = Some(filter.clone());
        }
        description = description.property_order(self.order.iter().cloned());

        let layout = GroupResolver::resolve(description)?;
        debug!(
            fields = self.fields.len(),
            groups = layout.groups().len(),
            "built dynamic layout"
        );
        Ok(DynamicLayout { layout, registry })
    }

    /// Declared fields with the explicit order applied
    fn ordered_fields(&self) -> std::result::Result<Vec<&FieldConfig>, ConfigError> {
        if let Some(blank) = self.fields.iter().find(|f| f.name.trim().is_empty()) {
            return Err(invalid(format!(
                "field with source {:?} has a blank name",
                blank.source
            )));
        }

        let mut names: AHashSet<&str> = AHashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(ConfigError::DuplicateField {
                    name: field.name.clone(),
                });
            }
        }

        let mut ordered: Vec<&FieldConfig> = Vec::with_capacity(self.fields.len());
        for name in &self.order {
            match self.fields.iter().find(|f| &f.name == name) {
                Some(field) => {
                    if !ordered.iter().any(|f| f.name == field.name) {
                        ordered.push(field);
                    }
                }
                // Group names are reported by the resolver.
                None if self.names_group(name) => {}
                None => {
                    return Err(invalid(format!("order names unknown field '{}'", name)));
                }
            }
        }
        for field in &self.fields {
            if !ordered.iter().any(|f| f.name == field.name) {
                ordered.push(field);
            }
        }
        Ok(ordered)
    }

    fn names_group(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.group.as_deref() == Some(name))
            || self.rule.as_ref().is_some_and(|r| r.group == name)
            || self.catch_all_group.as_deref() == Some(name)
    }
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::InvalidLayout { reason }
}

/// Resolved layout for JSON object records
pub struct DynamicLayout {
    layout: ResolvedLayout<JsonRecord>,
    registry: ViewRegistry,
}

impl DynamicLayout {
    /// The resolved layout
    pub fn layout(&self) -> &ResolvedLayout<JsonRecord> {
        &self.layout
    }

    /// View tag for `name` from the layout's view hierarchy
    ///
    /// Unknown names yield a root view that only activates unrestricted fields.
    pub fn view(&self, name: &str) -> ViewTag {
        self.registry.get(name).unwrap_or_else(|| ViewTag::new(name))
    }

    /// Filter id declared by the layout
    pub fn filter_id(&self) -> Option<&str> {
        self.layout.filter_id()
    }

    /// Render one record
    ///
    /// `ctx` is narrowed to this layout's filter id first.
    pub fn render(&self, record: &JsonRecord, ctx: &RenderContext) -> Result<JsonRecord> {
        let ctx = ctx.for_record(self.layout.filter_id())?;
        Ok(self.layout.render(record, &ctx)?)
    }

    /// Machine-readable summary of the resolved layout
    pub fn summary(&self) -> Value {
        let fields: Vec<Value> = self
            .layout
            .fields()
            .iter()
            .map(|field| {
                let mut entry = json!({
                    "name": field.name(),
                    "views": view_names(field.views()),
                    "filtered": field.is_filter_participant(),
                });
                if let Some(group) = self.layout.group(field.name()) {
                    entry["virtual"] = json!(true);
                    entry["members"] = group
                        .members()
                        .iter()
                        .map(|m| {
                            json!({
                                "name": m.name(),
                                "views": view_names(m.views()),
                                "filtered": m.is_filter_participant(),
                            })
                        })
                        .collect();
                    entry["catch_all"] = json!(group.catch_all().is_some());
                }
                entry
            })
            .collect();

        json!({
            "fields": fields,
            "catch_all": self.layout.catch_all().is_some(),
            "filter": self.layout.filter_id(),
        })
    }
}

fn view_names(views: &ViewSet) -> Vec<&str> {
    views.iter().map(ViewTag::name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jwrap_model::SerializeAllExcept;

    const LAYOUT: &str = r#"
filter = "f"
catch_all_group = "extra"

[views]
View = ["DefaultView"]

[[fields]]
name = "x"
views = ["DefaultView"]

[[fields]]
name = "y"
views = ["View"]
group = "wrapped"

[[fields]]
name = "z"
source = "zz"
views = ["DefaultView"]
group = "wrapped"
"#;

    fn record() -> JsonRecord {
        json!({"x": 42, "y": 4711, "zz": 10, "other": "left"})
            .as_object()
            .unwrap()
            .clone()
    }

    fn layout() -> DynamicLayout {
        LayoutConfig::from_toml_str(LAYOUT).unwrap().build().unwrap()
    }

    #[test]
    fn renders_groups_and_catch_all() {
        let out = layout().render(&record(), &RenderContext::new()).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"x": 42, "wrapped": {"y": 4711, "z": 10}, "extra": {"other": "left"}})
        );
    }

    #[test]
    fn view_hierarchy_from_config() {
        let layout = layout();
        let ctx = RenderContext::new().with_view(layout.view("DefaultView"));
        let out = layout.render(&record(), &ctx).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"x": 42, "wrapped": {"z": 10}, "extra": {"other": "left"}})
        );
    }

    #[test]
    fn filter_applies_by_layout_id() {
        let layout = layout();
        let provider = jwrap_model::FilterProvider::new()
            .with_filter("f", Arc::new(SerializeAllExcept::new(["x", "z"])));
        let ctx = RenderContext::new().with_filter_provider(Arc::new(provider));
        let out = layout.render(&record(), &ctx).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"wrapped": {"y": 4711}, "extra": {"other": "left"}})
        );
    }

    #[test]
    fn missing_keys_are_skipped() {
        let layout = layout();
        let record = json!({"x": 1}).as_object().unwrap().clone();
        let out = layout.render(&record, &RenderContext::new()).unwrap();
        assert_eq!(Value::Object(out), json!({"x": 1}));
    }

    #[test]
    fn order_moves_listed_fields_first() {
        let config = LayoutConfig::from_toml_str(
            r#"
order = ["b"]
[[fields]]
name = "a"
[[fields]]
name = "b"
"#,
        )
        .unwrap();
        let layout = config.build().unwrap();
        let names: Vec<&str> = layout.layout().fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn order_naming_group_is_rejected() {
        let config = LayoutConfig::from_toml_str(
            r#"
order = ["wrapped"]
[[fields]]
name = "y"
group = "wrapped"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.build(),
            Err(ConfigError::GroupNotOrderable { .. })
        ));
    }

    #[test]
    fn order_naming_nothing_is_rejected() {
        let config = LayoutConfig {
            order: vec!["ghost".to_string()],
            ..LayoutConfig::default()
        };
        assert!(matches!(
            config.build(),
            Err(ConfigError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let config = LayoutConfig::from_toml_str(
            r#"
[[fields]]
name = "a"
[[fields]]
name = "a"
source = "other"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.build(),
            Err(ConfigError::DuplicateField { .. })
        ));
    }

    #[test]
    fn duplicate_sources_are_rejected() {
        let config = LayoutConfig::from_toml_str(
            r#"
[[fields]]
name = "a"
source = "k"
[[fields]]
name = "b"
source = "k"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.build(),
            Err(ConfigError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn rule_groups_members() {
        let config = LayoutConfig::from_toml_str(
            r#"
[[fields]]
name = "x"
[[fields]]
name = "y"
[rule]
group = "wrapped"
members = ["y"]
"#,
        )
        .unwrap();
        let layout = config.build().unwrap();
        let record = json!({"x": 42, "y": 4711}).as_object().unwrap().clone();
        let out = layout.render(&record, &RenderContext::new()).unwrap();
        assert_eq!(Value::Object(out), json!({"x": 42, "wrapped": {"y": 4711}}));
    }

    #[test]
    fn unknown_keys_in_layout_are_rejected() {
        let result = LayoutConfig::from_toml_str("bogus = 1");
        assert!(matches!(result, Err(JwrapError::LayoutParse(_))));
    }

    #[test]
    fn summary_lists_virtual_members() {
        let summary = layout().summary();
        assert_eq!(summary["filter"], "f");
        assert_eq!(summary["fields"][1]["name"], "wrapped");
        assert_eq!(summary["fields"][1]["virtual"], true);
        assert_eq!(summary["fields"][1]["members"][0]["name"], "y");
        assert_eq!(summary["fields"][2]["name"], "extra");
        assert_eq!(summary["fields"][2]["catch_all"], true);
    }
}
