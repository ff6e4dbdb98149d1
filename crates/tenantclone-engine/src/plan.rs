//! Validated, dependency-ordered clone plans.
//!
//! A [`ClonePlan`] is built once at startup from a catalog of descriptors.
//! Every configuration mistake (cycles, dangling targets, bad identifiers,
//! an external column that is also a key) is rejected here so a clone run
//! never discovers it halfway through.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use tenantclone_core::identifiers::validate_identifier;
use tenantclone_core::{CloneableEntityType, Error, ForeignKeyTarget, Result, Scope};

/// Ordered list of entity types such that every type appears after all the
/// types it depends on.
#[derive(Debug, Clone)]
pub struct ClonePlan {
    entries: Vec<CloneableEntityType>,
    positions: HashMap<String, usize>,
}

impl ClonePlan {
    /// Validate a catalog and order it by dependency.
    pub fn new(catalog: Vec<CloneableEntityType>) -> Result<Self> {
        if catalog.is_empty() {
            return Err(Error::Plan("Clone plan has no entity types".to_string()));
        }

        let mut nodes: HashMap<&str, NodeIndex> = HashMap::with_capacity(catalog.len());
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(catalog.len(), catalog.len());
        for (i, entity) in catalog.iter().enumerate() {
            validate_descriptor(entity)?;
            if nodes.insert(entity.name.as_str(), graph.add_node(i)).is_some() {
                return Err(Error::Plan(format!(
                    "Entity type '{}' is declared twice",
                    entity.name
                )));
            }
        }

        // Edges run dependency -> dependent.
        for entity in &catalog {
            let dependent = nodes[entity.name.as_str()];
            for dep in entity.dependencies() {
                if dep == entity.name {
                    return Err(Error::Plan(format!(
                        "Entity type '{}' references itself",
                        entity.name
                    )));
                }
                let Some(&dependency) = nodes.get(dep) else {
                    return Err(Error::Plan(format!(
                        "Entity type '{}' references undeclared type '{}'",
                        entity.name, dep
                    )));
                };
                graph.add_edge(dependency, dependent, ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let name = &catalog[graph[cycle.node_id()]].name;
            Error::Plan(format!("Dependency cycle involving entity type '{}'", name))
        })?;

        let mut slots: Vec<Option<CloneableEntityType>> = catalog.into_iter().map(Some).collect();
        let entries: Vec<CloneableEntityType> = order
            .into_iter()
            .filter_map(|node| slots[graph[node]].take())
            .collect();
        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();

        debug!(
            subsystem = "engine",
            component = "plan",
            op = "build",
            entity_types = entries.len(),
            order = %entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join(" -> "),
            "Clone plan built"
        );

        Ok(Self { entries, positions })
    }

    /// Parse a JSON array of descriptors and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Vec<CloneableEntityType> = serde_json::from_str(json)?;
        Self::new(catalog)
    }

    /// Entity types in clone order.
    pub fn entries(&self) -> &[CloneableEntityType] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CloneableEntityType> {
        self.positions.get(name).map(|&i| &self.entries[i])
    }

    /// Position of an entity type in clone order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Entity type names in clone order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn plan_error(entity: &CloneableEntityType, err: Error) -> Error {
    Error::Plan(format!("Entity type '{}': {}", entity.name, err))
}

fn validate_descriptor(entity: &CloneableEntityType) -> Result<()> {
    if entity.name.trim().is_empty() {
        return Err(Error::Plan(format!(
            "Entity type for table '{}' has an empty name",
            entity.table
        )));
    }

    validate_identifier(&entity.table).map_err(|e| plan_error(entity, e))?;
    for column in entity.declared_columns() {
        validate_identifier(column).map_err(|e| plan_error(entity, e))?;
    }
    for fk in &entity.foreign_keys {
        if let ForeignKeyTarget::NotCloned(table) = &fk.target {
            validate_identifier(table).map_err(|e| plan_error(entity, e))?;
        }
    }

    if let Scope::ViaParent { links } = &entity.scope {
        if links.is_empty() {
            return Err(Error::Plan(format!(
                "Entity type '{}' is parent-scoped but declares no scope links",
                entity.name
            )));
        }
    }

    let mut keys: HashSet<&str> = HashSet::new();
    keys.insert(entity.primary_key.as_str());
    if let Some(col) = entity.organization_scope_column() {
        keys.insert(col);
    }
    keys.extend(entity.scope_links().iter().map(|l| l.column.as_str()));
    keys.extend(entity.foreign_keys.iter().map(|f| f.column.as_str()));
    keys.extend(entity.unique_columns.iter().map(|u| u.column.as_str()));

    if let Some(column) = entity
        .external_references
        .iter()
        .find(|c| keys.contains(c.as_str()))
    {
        return Err(Error::Plan(format!(
            "Entity type '{}': external reference column '{}' is also a key or unique column",
            entity.name, column
        )));
    }

    let mut seen_fk = HashSet::new();
    if let Some(fk) = entity
        .foreign_keys
        .iter()
        .find(|fk| !seen_fk.insert(fk.column.as_str()))
    {
        return Err(Error::Plan(format!(
            "Entity type '{}': foreign key column '{}' is declared twice",
            entity.name, fk.column
        )));
    }

    Ok(())
}
