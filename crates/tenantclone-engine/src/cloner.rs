//! Generic entity cloner.
//!
//! One implementation clones every entity type; the descriptor supplies all
//! table-specific knowledge. Rows are prepared sequentially in primary-key
//! order (sanitize, remap, resolve unique values, apply overrides) so the
//! result does not depend on scheduling, then written by a bounded pool of
//! workers. Each write runs under a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use tenantclone_core::{
    CloneableEntityType, EntityStore, EntityTypeResult, Error, ForeignKeyTarget, IdMapping,
    MissingTargetPolicy, Organization, OrganizationId, OverrideValue, PhaseMappings, Result, Row,
    RowError, RowId, TableRef,
};

use crate::config::EngineConfig;
use crate::plan::ClonePlan;
use crate::sanitizer::sanitize_external_references;
use crate::scope::owned_rows;
use crate::uniqueness::UniquenessResolver;

/// Inputs shared by every phase of one clone run.
#[derive(Debug, Clone, Copy)]
pub struct PhaseContext<'a> {
    pub plan: &'a ClonePlan,
    pub source: OrganizationId,
    pub destination: &'a Organization,
    /// Mappings of every earlier phase. Read-only while a phase runs.
    pub mapping: &'a IdMapping,
    /// Suffix for unique values, see [`crate::uniqueness::destination_suffix`].
    pub suffix: &'a str,
}

/// What one phase produced.
#[derive(Debug)]
pub struct PhaseOutcome {
    pub result: EntityTypeResult,
    pub mappings: PhaseMappings,
    /// First structural write error. The phase drained, but the job must stop.
    pub aborted: Option<Error>,
}

/// A row ready to be written.
#[derive(Debug)]
struct PreparedRow {
    source_id: RowId,
    row: Row,
    nulled: u64,
}

/// Where a foreign-key value points after remapping.
enum Remapped {
    Null,
    Mapped(RowId),
    Missing(RowId),
}

fn remap(value: Option<&JsonValue>, target: Option<&str>, mapping: &IdMapping) -> Result<Remapped> {
    let Some(old) = RowId::from_json(value.unwrap_or(&JsonValue::Null))? else {
        return Ok(Remapped::Null);
    };
    Ok(match target.and_then(|t| mapping.get(t, &old)) {
        Some(new) => Remapped::Mapped(new),
        None => Remapped::Missing(old),
    })
}

/// Build the destination form of one source row.
fn prepare_row(
    entity: &CloneableEntityType,
    ctx: &PhaseContext<'_>,
    resolver: &mut UniquenessResolver,
    ordinal: usize,
    source: &Row,
) -> std::result::Result<PreparedRow, RowError> {
    let source_id = RowId::require(source, &entity.primary_key).map_err(|e| RowError {
        source_id: None,
        message: e.to_string(),
    })?;
    let row_error = |message: String| RowError {
        source_id: Some(source_id),
        message,
    };

    let mut row = source.clone();
    row.remove(&entity.primary_key);
    if let Some(column) = entity.organization_scope_column() {
        row.insert(column.to_string(), ctx.destination.id.to_json());
    }

    sanitize_external_references(entity, &mut row);

    for link in entity.scope_links() {
        match remap(source.get(&link.column), Some(&link.parent), ctx.mapping)
            .map_err(|e| row_error(e.to_string()))?
        {
            Remapped::Null => {}
            Remapped::Mapped(new) => {
                row.insert(link.column.clone(), new.to_json());
            }
            Remapped::Missing(old) => {
                return Err(row_error(format!(
                    "Scope link {} -> {} {} was not cloned",
                    link.column, link.parent, old
                )));
            }
        }
    }

    let mut nulled = 0;
    for fk in &entity.foreign_keys {
        let target = match &fk.target {
            ForeignKeyTarget::Entity(name) => Some(name.as_str()),
            ForeignKeyTarget::NotCloned(_) => None,
        };
        match remap(source.get(&fk.column), target, ctx.mapping)
            .map_err(|e| row_error(e.to_string()))?
        {
            Remapped::Null => {}
            Remapped::Mapped(new) => {
                row.insert(fk.column.clone(), new.to_json());
            }
            Remapped::Missing(old) => match fk.policy {
                MissingTargetPolicy::NullOut => {
                    debug!(
                        entity_type = %entity.name,
                        column = %fk.column,
                        source_id = %source_id,
                        target_id = %old,
                        "Reference target not cloned, setting to null"
                    );
                    row.insert(fk.column.clone(), JsonValue::Null);
                    nulled += 1;
                }
                MissingTargetPolicy::Fail => {
                    return Err(row_error(format!(
                        "Reference {} = {} has no cloned target",
                        fk.column, old
                    )));
                }
            },
        }
    }

    resolver
        .resolve(source_id, ordinal, &mut row)
        .map_err(|e| row_error(e.to_string()))?;

    for o in &entity.overrides {
        let value = match &o.value {
            OverrideValue::Fixed(v) => v.clone(),
            OverrideValue::DestinationName => JsonValue::String(ctx.destination.name.clone()),
        };
        row.insert(o.column.clone(), value);
    }

    Ok(PreparedRow {
        source_id,
        row,
        nulled,
    })
}

async fn write_row(
    store: Arc<dyn EntityStore>,
    table: String,
    primary_key: String,
    target: Option<RowId>,
    row: Row,
) -> Result<RowId> {
    let table = TableRef::new(&table, &primary_key);
    match target {
        Some(id) => {
            store.update_row(table, &id, row).await?;
            Ok(id)
        }
        None => store.insert_row(table, row).await,
    }
}

/// Clones the rows of one entity type.
pub struct EntityCloner {
    store: Arc<dyn EntityStore>,
    config: EngineConfig,
}

impl EntityCloner {
    pub fn new(store: Arc<dyn EntityStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Clone every source row of `entity` into the destination.
    ///
    /// Row problems are recorded in the result and never abort the phase.
    /// `Err` means the phase could not run because source or destination rows
    /// could not be read. A write that lost the store itself is reported in
    /// [`PhaseOutcome::aborted`] next to the counts of the rows that drained.
    pub async fn clone_entity_type(
        &self,
        entity: &CloneableEntityType,
        ctx: &PhaseContext<'_>,
    ) -> Result<PhaseOutcome> {
        let start = Instant::now();
        let mut result = EntityTypeResult::new(entity.name.clone());
        let mut mappings = PhaseMappings::new(entity.name.clone());

        let mut source_rows = owned_rows(self.store.as_ref(), ctx.plan, entity, ctx.source).await?;
        let existing =
            owned_rows(self.store.as_ref(), ctx.plan, entity, ctx.destination.id).await?;
        result.preexisting = existing.len() as u64;

        let mut singleton_target = None;
        if entity.is_singleton() {
            if source_rows.len() > 1 {
                warn!(
                    entity_type = %entity.name,
                    source_rows = source_rows.len(),
                    "Singleton type has several source rows, cloning the lowest id only"
                );
                source_rows.truncate(1);
            }
            singleton_target = existing
                .first()
                .map(|r| RowId::require(r, &entity.primary_key))
                .transpose()?;
        }

        debug!(
            entity_type = %entity.name,
            source_rows = source_rows.len(),
            preexisting = result.preexisting,
            update_existing = singleton_target.is_some(),
            "Cloning entity type"
        );

        let mut resolver = UniquenessResolver::new(entity, ctx.suffix, &existing);
        let mut prepared = Vec::with_capacity(source_rows.len());
        for (i, source) in source_rows.iter().enumerate() {
            result.attempted += 1;
            match prepare_row(entity, ctx, &mut resolver, i + 1, source) {
                Ok(row) => prepared.push(row),
                Err(e) => {
                    warn!(
                        entity_type = %entity.name,
                        source_id = ?e.source_id,
                        error = %e.message,
                        "Row skipped"
                    );
                    result.push_error(e.source_id, e.message);
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_rows));
        let row_timeout = self.config.row_timeout;
        let mut tasks = JoinSet::new();
        for row in prepared {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(format!("Row worker pool closed: {}", e)))?;
            let store = Arc::clone(&self.store);
            let table = entity.table.clone();
            let primary_key = entity.primary_key.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let PreparedRow {
                    source_id,
                    row,
                    nulled,
                } = row;
                let outcome = match tokio::time::timeout(
                    row_timeout,
                    write_row(store, table, primary_key, singleton_target, row),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(timeout_error(row_timeout)),
                };
                (source_id, nulled, outcome)
            });
        }

        let mut aborted: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source_id, nulled, Ok(new_id))) => {
                    trace!(
                        entity_type = %entity.name,
                        source_id = %source_id,
                        new_id = %new_id,
                        "Row cloned"
                    );
                    result.succeeded += 1;
                    result.nulled_references += nulled;
                    mappings.push(source_id, new_id);
                }
                Ok((source_id, _, Err(e))) if e.is_structural() => {
                    error!(
                        entity_type = %entity.name,
                        source_id = %source_id,
                        error = %e,
                        "Row write failed, store unavailable"
                    );
                    result.push_error(Some(source_id), e.to_string());
                    if aborted.is_none() {
                        aborted = Some(e);
                    }
                }
                Ok((source_id, _, Err(e))) => {
                    warn!(
                        entity_type = %entity.name,
                        source_id = %source_id,
                        error = %e,
                        "Row write failed"
                    );
                    result.push_error(Some(source_id), e.to_string());
                }
                Err(e) => {
                    error!(entity_type = %entity.name, error = ?e, "Row task panicked");
                    result.push_error(None, format!("Row task failed: {}", e));
                }
            }
        }
        result.errors.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        info!(
            subsystem = "engine",
            component = "cloner",
            op = "clone_phase",
            entity_type = %entity.name,
            db_table = %entity.table,
            attempted = result.attempted,
            succeeded = result.succeeded,
            failed = result.failed,
            nulled_references = result.nulled_references,
            duration_ms = start.elapsed().as_millis() as u64,
            aborted = aborted.is_some(),
            "Entity type cloned"
        );

        Ok(PhaseOutcome {
            result,
            mappings,
            aborted,
        })
    }
}

fn timeout_error(timeout: Duration) -> Error {
    Error::Timeout(format!(
        "Row write exceeded timeout of {}ms",
        timeout.as_millis()
    ))
}
