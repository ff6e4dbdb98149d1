//! Collision-free names and slugs within the destination organization.
//!
//! Every cloned value of a unique column gets a suffix derived from the
//! destination organization, so the first candidate is stable across runs
//! into the same destination. If that candidate is already taken (by a
//! pre-existing destination row or by an earlier row of the same run),
//! `-2`, `-3`, ... are appended until a free value is found.

use std::collections::{HashMap, HashSet};

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use tenantclone_core::defaults::{MAX_SUFFIX_ATTEMPTS, SUFFIX_LEN};
use tenantclone_core::{
    CloneableEntityType, Error, OrganizationId, Result, Row, RowId, UniqueColumn, UniqueKind,
};

/// Destination suffix appended to unique values.
///
/// Without a seed this is the first eight hex digits of the destination id.
/// With a seed it is the first eight hex digits of `SHA-256("{seed}:{destination}")`.
pub fn destination_suffix(destination: OrganizationId, seed: Option<&str>) -> String {
    match seed {
        Some(seed) => {
            let digest = Sha256::digest(format!("{}:{}", seed, destination).as_bytes());
            hex::encode(digest)[..SUFFIX_LEN].to_string()
        }
        None => destination.as_uuid().simple().to_string()[..SUFFIX_LEN].to_string(),
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes.
pub fn normalize_slug(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut dash = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if dash && !slug.is_empty() {
                slug.push('-');
            }
            dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            dash = true;
        }
    }
    slug
}

fn value_as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Resolves unique columns for one entity type within one destination.
#[derive(Debug)]
pub struct UniquenessResolver {
    entity_type: String,
    columns: Vec<UniqueColumn>,
    suffix: String,
    taken: HashMap<String, HashSet<String>>,
    resolved: HashMap<(RowId, String), String>,
}

impl UniquenessResolver {
    /// Build a resolver seeded with the values `existing` destination rows
    /// already hold.
    pub fn new(entity: &CloneableEntityType, suffix: impl Into<String>, existing: &[Row]) -> Self {
        let mut taken: HashMap<String, HashSet<String>> = HashMap::new();
        for column in &entity.unique_columns {
            let values = taken.entry(column.column.clone()).or_default();
            values.extend(
                existing
                    .iter()
                    .filter_map(|r| r.get(&column.column).and_then(value_as_text)),
            );
        }
        Self {
            entity_type: entity.name.clone(),
            columns: entity.unique_columns.clone(),
            suffix: suffix.into(),
            taken,
            resolved: HashMap::new(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Rewrite every unique column present in `row`.
    ///
    /// `ordinal` is the 1-based position of the row in source order and names
    /// rows whose value is empty.
    pub fn resolve(&mut self, source_id: RowId, ordinal: usize, row: &mut Row) -> Result<()> {
        for column in self.columns.clone() {
            let Some(current) = row.get(&column.column) else {
                continue;
            };
            let base = value_as_text(current);
            let value = self.resolve_value(source_id, ordinal, &column, base.as_deref())?;
            row.insert(column.column.clone(), JsonValue::String(value));
        }
        Ok(())
    }

    /// Unique value for one column of one source row. Repeated calls for the
    /// same row and column return the same value.
    pub fn resolve_value(
        &mut self,
        source_id: RowId,
        ordinal: usize,
        column: &UniqueColumn,
        base: Option<&str>,
    ) -> Result<String> {
        let key = (source_id, column.column.clone());
        if let Some(value) = self.resolved.get(&key) {
            return Ok(value.clone());
        }

        let base = match column.kind {
            UniqueKind::Slug => base.map(normalize_slug),
            UniqueKind::Name => base.map(|b| b.trim().to_string()),
        }
        .filter(|b| !b.is_empty());

        let mut candidate = match base {
            Some(base) => format!("{}-{}", base, self.suffix),
            None => format!("{}-{}-{}", self.entity_type, ordinal, self.suffix),
        };
        if column.kind == UniqueKind::Slug {
            candidate = normalize_slug(&candidate);
        }

        let taken = self.taken.entry(column.column.clone()).or_default();
        let mut value = candidate.clone();
        let mut attempt = 1;
        while taken.contains(&value) {
            attempt += 1;
            if attempt > MAX_SUFFIX_ATTEMPTS {
                return Err(Error::Conflict(format!(
                    "No free value for {}.{} after {} attempts (base '{}')",
                    self.entity_type, column.column, MAX_SUFFIX_ATTEMPTS, candidate
                )));
            }
            value = format!("{}-{}", candidate, attempt);
        }

        taken.insert(value.clone());
        self.resolved.insert(key, value.clone());
        Ok(value)
    }
}
