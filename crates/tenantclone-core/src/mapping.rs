//! Old-id to new-id translation for one clone run.
//!
//! The orchestrator owns the only mutable [`IdMapping`]. Each phase reads a
//! shared snapshot and returns its own [`PhaseMappings`]; the orchestrator
//! merges them after the phase has fully drained, so no phase ever observes a
//! mapping that is still being written.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::RowId;

/// One recorded translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub old_id: RowId,
    pub new_id: RowId,
}

/// Mappings produced by a single entity-type phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseMappings {
    entity_type: String,
    entries: Vec<MappingEntry>,
}

impl PhaseMappings {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entries: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn push(&mut self, old_id: RowId, new_id: RowId) {
        self.entries.push(MappingEntry { old_id, new_id });
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Append-only `(entity type, old id) → new id` map.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    by_type: HashMap<String, HashMap<RowId, RowId>>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a translation. An old id may be recorded only once per type.
    pub fn insert(&mut self, entity_type: &str, old_id: RowId, new_id: RowId) -> Result<()> {
        let entries = self.by_type.entry(entity_type.to_string()).or_default();
        if let Some(existing) = entries.get(&old_id) {
            return Err(Error::Conflict(format!(
                "{} {} is already mapped to {}",
                entity_type, old_id, existing
            )));
        }
        entries.insert(old_id, new_id);
        Ok(())
    }

    /// Merge a finished phase. Fails without partial writes if any old id of
    /// the phase is already mapped or appears twice.
    pub fn merge(&mut self, phase: PhaseMappings) -> Result<usize> {
        let existing = self.by_type.get(phase.entity_type());
        let mut seen = HashSet::with_capacity(phase.len());
        for entry in phase.entries() {
            let duplicate = !seen.insert(entry.old_id)
                || existing.is_some_and(|m| m.contains_key(&entry.old_id));
            if duplicate {
                return Err(Error::Conflict(format!(
                    "{} {} mapped twice",
                    phase.entity_type(),
                    entry.old_id
                )));
            }
        }

        let count = phase.len();
        let PhaseMappings {
            entity_type,
            entries,
        } = phase;
        let target = self.by_type.entry(entity_type).or_default();
        target.extend(entries.into_iter().map(|e| (e.old_id, e.new_id)));
        Ok(count)
    }

    /// New id for `old_id` of `entity_type`, if that row was cloned.
    pub fn get(&self, entity_type: &str, old_id: &RowId) -> Option<RowId> {
        self.by_type
            .get(entity_type)
            .and_then(|m| m.get(old_id))
            .copied()
    }

    /// Number of mapped rows of one type.
    pub fn count(&self, entity_type: &str) -> usize {
        self.by_type.get(entity_type).map_or(0, |m| m.len())
    }

    /// Total mapped rows across all types.
    pub fn len(&self) -> usize {
        self.by_type.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// New ids recorded for one type.
    pub fn new_ids(&self, entity_type: &str) -> HashSet<RowId> {
        self.by_type
            .get(entity_type)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default()
    }
}
