//! Declarative descriptors for cloneable entity types.
//!
//! A [`CloneableEntityType`] says everything the generic cloner needs to know
//! about one table: how its rows belong to an organization, which columns are
//! foreign keys and what to do when their target was not cloned, which columns
//! must stay unique per organization, and which columns point at external
//! systems. Descriptors deserialize from JSON so a catalog can also be loaded
//! from a file.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::defaults::{ORGANIZATION_COLUMN, PRIMARY_KEY_COLUMN};

/// How rows of a table belong to an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Scope {
    /// The row carries the organization id in `column`.
    Organization { column: String },
    /// The row has no organization column; it belongs to whichever
    /// organization owns the parent row referenced by any of `links`.
    ViaParent { links: Vec<ScopeLink> },
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Organization {
            column: ORGANIZATION_COLUMN.to_string(),
        }
    }
}

/// A column through which a row inherits its parent's organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeLink {
    pub column: String,
    /// Entity type name of the parent.
    pub parent: String,
}

/// How many rows of the type one organization may own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    Many,
    /// At most one row per organization; an existing destination row is
    /// updated instead of inserting a second one.
    Singleton,
}

/// What a foreign key points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyTarget {
    /// Another cloneable entity type in the same catalog.
    Entity(String),
    /// A table outside the clone set. Values are never mapped.
    NotCloned(String),
}

/// Behaviour when a foreign key's target has no mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTargetPolicy {
    /// Write null and keep the row.
    #[default]
    NullOut,
    /// Fail the row; sibling rows continue.
    Fail,
}

/// A foreign-key column owned by an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub target: ForeignKeyTarget,
    #[serde(default)]
    pub policy: MissingTargetPolicy,
}

/// Shape of a unique-per-organization value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueKind {
    /// Free-form display name; kept as-is apart from the suffix.
    #[default]
    Name,
    /// URL slug; normalised to lowercase ASCII and dashes.
    Slug,
}

/// A column that must be unique within one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueColumn {
    pub column: String,
    #[serde(default)]
    pub kind: UniqueKind,
}

/// Value forced into a column of every cloned row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideValue {
    Fixed(JsonValue),
    /// The destination organization's display name.
    DestinationName,
}

/// A column override applied after remapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnOverride {
    pub column: String,
    pub value: OverrideValue,
}

fn default_primary_key() -> String {
    PRIMARY_KEY_COLUMN.to_string()
}

/// Descriptor for one cloneable table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneableEntityType {
    /// Entity type key used in plans, mappings, and results.
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub unique_columns: Vec<UniqueColumn>,
    #[serde(default)]
    pub external_references: Vec<String>,
    #[serde(default)]
    pub overrides: Vec<ColumnOverride>,
}

impl CloneableEntityType {
    /// Organization-scoped, many-row type keyed by `id`.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            scope: Scope::default(),
            cardinality: Cardinality::Many,
            foreign_keys: Vec::new(),
            unique_columns: Vec::new(),
            external_references: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Scope by an organization column other than `organization_id`.
    pub fn organization_column(mut self, column: impl Into<String>) -> Self {
        self.scope = Scope::Organization {
            column: column.into(),
        };
        self
    }

    /// Add a join-scope link. Switches the type to parent scope.
    pub fn via_parent(mut self, column: impl Into<String>, parent: impl Into<String>) -> Self {
        let link = ScopeLink {
            column: column.into(),
            parent: parent.into(),
        };
        match &mut self.scope {
            Scope::ViaParent { links } => links.push(link),
            Scope::Organization { .. } => self.scope = Scope::ViaParent { links: vec![link] },
        }
        self
    }

    pub fn singleton(mut self) -> Self {
        self.cardinality = Cardinality::Singleton;
        self
    }

    /// Foreign key to another cloneable type.
    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        target: impl Into<String>,
        policy: MissingTargetPolicy,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            target: ForeignKeyTarget::Entity(target.into()),
            policy,
        });
        self
    }

    /// Foreign key to a table that is never cloned.
    pub fn uncloned_reference(
        mut self,
        column: impl Into<String>,
        table: impl Into<String>,
        policy: MissingTargetPolicy,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            target: ForeignKeyTarget::NotCloned(table.into()),
            policy,
        });
        self
    }

    pub fn unique(mut self, column: impl Into<String>, kind: UniqueKind) -> Self {
        self.unique_columns.push(UniqueColumn {
            column: column.into(),
            kind,
        });
        self
    }

    pub fn external(mut self, column: impl Into<String>) -> Self {
        self.external_references.push(column.into());
        self
    }

    pub fn override_value(mut self, column: impl Into<String>, value: JsonValue) -> Self {
        self.overrides.push(ColumnOverride {
            column: column.into(),
            value: OverrideValue::Fixed(value),
        });
        self
    }

    pub fn override_destination_name(mut self, column: impl Into<String>) -> Self {
        self.overrides.push(ColumnOverride {
            column: column.into(),
            value: OverrideValue::DestinationName,
        });
        self
    }

    /// Organization column, for organization-scoped types.
    pub fn organization_scope_column(&self) -> Option<&str> {
        match &self.scope {
            Scope::Organization { column } => Some(column),
            Scope::ViaParent { .. } => None,
        }
    }

    /// Join-scope links, for parent-scoped types.
    pub fn scope_links(&self) -> &[ScopeLink] {
        match &self.scope {
            Scope::Organization { .. } => &[],
            Scope::ViaParent { links } => links,
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.cardinality == Cardinality::Singleton
    }

    /// Entity types that must be cloned before this one.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self
            .foreign_keys
            .iter()
            .filter_map(|fk| match &fk.target {
                ForeignKeyTarget::Entity(name) => Some(name.as_str()),
                ForeignKeyTarget::NotCloned(_) => None,
            })
            .chain(self.scope_links().iter().map(|l| l.parent.as_str()))
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Every column this descriptor names, for identifier validation.
    pub fn declared_columns(&self) -> Vec<&str> {
        let mut cols = vec![self.primary_key.as_str()];
        if let Some(col) = self.organization_scope_column() {
            cols.push(col);
        }
        cols.extend(self.scope_links().iter().map(|l| l.column.as_str()));
        cols.extend(self.foreign_keys.iter().map(|f| f.column.as_str()));
        cols.extend(self.unique_columns.iter().map(|u| u.column.as_str()));
        cols.extend(self.external_references.iter().map(|c| c.as_str()));
        cols.extend(self.overrides.iter().map(|o| o.column.as_str()));
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_defaults() {
        let t = CloneableEntityType::new("product", "product");
        assert_eq!(t.primary_key, "id");
        assert_eq!(t.organization_scope_column(), Some("organization_id"));
        assert!(!t.is_singleton());
        assert!(t.dependencies().is_empty());
    }

    #[test]
    fn test_dependencies_from_fks_and_scope() {
        let t = CloneableEntityType::new("pricing_plan_feature", "pricingplan_features")
            .via_parent("pricingplan_id", "pricing_plan")
            .foreign_key("pricingplan_id", "pricing_plan", MissingTargetPolicy::Fail)
            .foreign_key("feature_id", "feature", MissingTargetPolicy::NullOut)
            .uncloned_reference("course_id", "course", MissingTargetPolicy::NullOut);

        assert_eq!(t.dependencies(), vec!["feature", "pricing_plan"]);
        assert_eq!(t.organization_scope_column(), None);
        assert_eq!(t.scope_links().len(), 1);
    }

    #[test]
    fn test_via_parent_accumulates_links() {
        let t = CloneableEntityType::new("metric_link", "website_templatesection_metrics")
            .via_parent("templatesection_id", "template_section")
            .via_parent("metric_id", "website_metric");
        assert_eq!(t.scope_links().len(), 2);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let t: CloneableEntityType = serde_json::from_value(json!({
            "name": "product",
            "table": "product",
            "foreign_keys": [
                {"column": "product_sub_type_id", "target": {"entity": "product_sub_type"}},
                {"column": "quiz_id", "target": {"not_cloned": "quiz"}, "policy": "fail"}
            ],
            "unique_columns": [{"column": "slug", "kind": "slug"}],
            "external_references": ["stripe_product_id"]
        }))
        .unwrap();

        assert_eq!(t.primary_key, "id");
        assert_eq!(t.scope, Scope::default());
        assert_eq!(t.foreign_keys[0].policy, MissingTargetPolicy::NullOut);
        assert_eq!(t.foreign_keys[1].policy, MissingTargetPolicy::Fail);
        assert_eq!(
            t.foreign_keys[1].target,
            ForeignKeyTarget::NotCloned("quiz".into())
        );
        assert_eq!(t.unique_columns[0].kind, UniqueKind::Slug);
    }

    #[test]
    fn test_deserialize_parent_scope() {
        let t: CloneableEntityType = serde_json::from_value(json!({
            "name": "inventory",
            "table": "inventory",
            "scope": {"kind": "via_parent", "links": [{"column": "pricing_plan_id", "parent": "pricing_plan"}]},
            "overrides": [{"column": "quantity", "value": {"fixed": 100}}]
        }))
        .unwrap();

        assert_eq!(t.dependencies(), vec!["pricing_plan"]);
        assert_eq!(t.overrides[0].value, OverrideValue::Fixed(json!(100)));
    }

    #[test]
    fn test_declared_columns() {
        let t = CloneableEntityType::new("settings", "settings")
            .singleton()
            .external("domain")
            .override_destination_name("site");
        let cols = t.declared_columns();
        assert!(cols.contains(&"id"));
        assert!(cols.contains(&"organization_id"));
        assert!(cols.contains(&"domain"));
        assert!(cols.contains(&"site"));
    }
}
