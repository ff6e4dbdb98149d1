//! Clone orchestrator.
//!
//! Walks a validated [`ClonePlan`] one entity type at a time, owns the only
//! mutable [`IdMapping`] of the run, and drives the job through
//! `Pending -> Running -> {Completed, CompletedWithErrors, Failed, Cancelled}`.

use std::sync::Arc;
use std::time::Instant;

use tracing::field::Empty;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use tenantclone_core::logging;
use tenantclone_core::{
    CloneAuditRepository, CloneDestination, CloneJob, CloneStatus, EntityStore, Error, IdMapping,
    NewOrganization, Organization, OrganizationId, Result,
};

use crate::cancel::CancelHandle;
use crate::cloner::{EntityCloner, PhaseContext};
use crate::config::EngineConfig;
use crate::plan::ClonePlan;
use crate::uniqueness::destination_suffix;
use crate::verification::verify_clone;

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Seed for the unique-value suffix. Defaults to the destination id.
    pub suffix_seed: Option<String>,
    /// Run the verification pass after a clone. `None` follows
    /// [`EngineConfig::verify`].
    pub verify: Option<bool>,
    /// Checked between entity-type phases.
    pub cancel: Option<CancelHandle>,
    /// Recorded on a newly created destination organization.
    pub created_by_email: Option<String>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            suffix_seed: None,
            verify: None,
            cancel: None,
            created_by_email: None,
        }
    }
}

impl CloneOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suffix_seed(mut self, seed: impl Into<String>) -> Self {
        self.suffix_seed = Some(seed.into());
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_created_by(mut self, email: impl Into<String>) -> Self {
        self.created_by_email = Some(email.into());
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled)
    }
}

/// Runs clone jobs against one store with one plan.
pub struct CloneOrchestrator {
    store: Arc<dyn EntityStore>,
    plan: ClonePlan,
    config: EngineConfig,
    cloner: EntityCloner,
    audit: Option<Arc<dyn CloneAuditRepository>>,
}

impl CloneOrchestrator {
    pub fn new(store: Arc<dyn EntityStore>, plan: ClonePlan, config: EngineConfig) -> Self {
        Self {
            cloner: EntityCloner::new(Arc::clone(&store), config.clone()),
            store,
            plan,
            config,
            audit: None,
        }
    }

    /// Persist every finished job to `audit`.
    pub fn with_audit(mut self, audit: Arc<dyn CloneAuditRepository>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn plan(&self) -> &ClonePlan {
        &self.plan
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clone `source` into `destination`.
    ///
    /// Never returns an error: structural failures end the job as `Failed`
    /// with the message in [`CloneJob::error`], row failures end it as
    /// `CompletedWithErrors` with per-type details.
    pub async fn clone_organization(
        &self,
        source: OrganizationId,
        destination: CloneDestination,
        options: CloneOptions,
    ) -> CloneJob {
        let mut job = CloneJob::new(source);
        let span = info_span!(
            "clone_job",
            subsystem = "engine",
            component = "orchestrator",
            job_id = %job.id,
            source_org = %source,
            destination_org = Empty,
            status = Empty,
        );

        async {
            let start = Instant::now();
            info!(op = "start", "Clone job started");

            match self.run(&mut job, destination, &options).await {
                Ok(status) => job.finish(status),
                Err(e) => {
                    error!(op = "run", error = %e, "Clone job failed");
                    job.fail(&e);
                }
            }
            Span::current().record(logging::STATUS, job.status.as_str());

            info!(
                op = "finish",
                attempted = job.total_attempted(),
                succeeded = job.total_succeeded(),
                failed = job.total_failed(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Clone job finished"
            );

            if let Some(audit) = &self.audit {
                if let Err(e) = audit.record(&job).await {
                    warn!(op = "audit", error = %e, "Failed to record clone job");
                }
            }
        }
        .instrument(span)
        .await;

        job
    }

    async fn run(
        &self,
        job: &mut CloneJob,
        destination: CloneDestination,
        options: &CloneOptions,
    ) -> Result<CloneStatus> {
        job.status = CloneStatus::Running;

        let source = self
            .store
            .get_organization(job.source_organization_id)
            .await?
            .ok_or(Error::OrganizationNotFound(job.source_organization_id))?;
        if source.is_protected() {
            return Err(Error::Forbidden(format!(
                "Organization {} is a {} organization and cannot be cloned",
                source.id,
                source.kind.as_deref().unwrap_or("protected")
            )));
        }

        let pending = self.resolve_destination(&source, destination, options).await?;
        if let PendingDestination::Existing(org) = &pending {
            job.destination_organization_id = Some(org.id);
        }

        if !self.source_has_rows(source.id).await? {
            info!(op = "precheck", "Source organization owns no cloneable rows");
            return Ok(CloneStatus::Completed);
        }

        let destination = match pending {
            PendingDestination::Existing(org) => org,
            PendingDestination::New(req) => {
                let org = self.store.create_organization(req).await?;
                info!(
                    op = "create_destination",
                    destination = %org.id,
                    name = %org.name,
                    "Destination organization created"
                );
                org
            }
        };
        job.destination_organization_id = Some(destination.id);
        Span::current().record(logging::DESTINATION_ORG, tracing::field::display(destination.id));

        let suffix = destination_suffix(destination.id, options.suffix_seed.as_deref());
        let mut mapping = IdMapping::new();

        for entity in self.plan.entries() {
            if options.is_cancelled() {
                info!(
                    op = "cancel",
                    completed_types = job.per_entity_type.len(),
                    next_type = %entity.name,
                    "Clone job cancelled between phases"
                );
                return Ok(CloneStatus::Cancelled);
            }

            let ctx = PhaseContext {
                plan: &self.plan,
                source: source.id,
                destination: &destination,
                mapping: &mapping,
                suffix: &suffix,
            };
            let outcome = self.cloner.clone_entity_type(entity, &ctx).await?;
            job.per_entity_type.push(outcome.result);
            if let Some(e) = outcome.aborted {
                return Err(e);
            }
            let merged = mapping.merge(outcome.mappings)?;
            debug!(
                op = "merge",
                entity_type = %entity.name,
                merged,
                total_mapped = mapping.len(),
                "Phase mappings merged"
            );
        }

        let mut status = if job.total_failed() > 0 {
            CloneStatus::CompletedWithErrors
        } else {
            CloneStatus::Completed
        };

        if options.verify.unwrap_or(self.config.verify) {
            match verify_clone(
                self.store.as_ref(),
                &self.plan,
                source.id,
                destination.id,
                &job.per_entity_type,
            )
            .await
            {
                Ok(report) => {
                    if !report.passed {
                        status = CloneStatus::CompletedWithErrors;
                    }
                    job.verification = Some(report);
                }
                Err(e) => {
                    warn!(op = "verify", error = %e, "Verification could not run");
                    job.error = Some(format!("Verification could not run: {}", e));
                    status = CloneStatus::CompletedWithErrors;
                }
            }
        }

        Ok(status)
    }

    async fn resolve_destination(
        &self,
        source: &Organization,
        destination: CloneDestination,
        options: &CloneOptions,
    ) -> Result<PendingDestination> {
        match destination {
            CloneDestination::Existing(id) => {
                if id == source.id {
                    return Err(Error::InvalidInput(
                        "Destination organization must differ from the source".to_string(),
                    ));
                }
                let org = self
                    .store
                    .get_organization(id)
                    .await?
                    .ok_or(Error::OrganizationNotFound(id))?;
                Ok(PendingDestination::Existing(org))
            }
            CloneDestination::New { name } => {
                let mut req = NewOrganization::new(&name, source.kind.clone())?;
                if let Some(email) = &options.created_by_email {
                    req = req.with_created_by(email.clone());
                }
                Ok(PendingDestination::New(req))
            }
        }
    }

    /// Whether the source owns at least one row of an organization-scoped type.
    async fn source_has_rows(&self, source: OrganizationId) -> Result<bool> {
        for entity in self.plan.entries() {
            let Some(column) = entity.organization_scope_column() else {
                continue;
            };
            if self
                .store
                .count_by_organization(&entity.table, column, source)
                .await?
                > 0
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

enum PendingDestination {
    Existing(Organization),
    New(NewOrganization),
}
