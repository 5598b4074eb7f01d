//! Recomputes and caches campus health whenever issues change.
//!
//! Every trigger reloads the full issue set for the affected campus, so
//! concurrent recomputations for the same campus may race; the last write
//! wins and is still a complete snapshot.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StoreError, SyncError, SyncResult};
use crate::health::{self, DEFAULT_PREVIOUS_SCORE};
use crate::models::{
    Actor, AuditAction, AuditEntry, AuditState, HealthSummary, Issue, NewIssue, Severity,
    SlaStatus, TimelineEntry, STATUS_ACTIONED, STATUS_ESCALATED, STATUS_OPEN, STATUS_RESOLVED,
};
use crate::sla;
use crate::store::{CampusStore, IssueStore};

const BREACH_MESSAGE: &str =
    "SYSTEM: SLA Breach detected. Issue automatically escalated for priority resolution.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub processed: usize,
    pub breached: usize,
    pub campuses: Vec<Uuid>,
}

pub struct HealthSync<S> {
    store: S,
}

impl<S> HealthSync<S>
where
    S: IssueStore + CampusStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn sync_campus(&self, campus_id: Uuid) -> SyncResult<HealthSummary> {
        let campus = match self.store.get_campus(campus_id).await {
            Ok(campus) => campus,
            Err(err @ StoreError::CampusNotFound(_)) => {
                warn!(%campus_id, "campus not found, skipping health sync");
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let issues = self.store.issues_for_campus(campus_id).await?;
        let previous_score = campus
            .health_summary
            .as_ref()
            .map(|summary| summary.score)
            .unwrap_or(DEFAULT_PREVIOUS_SCORE);

        let summary = health::compute_health_now(&issues, previous_score);
        self.store
            .save_health(campus_id, &summary, summary.last_updated)
            .await?;

        info!(
            %campus_id,
            score = summary.score,
            trend = %summary.trend,
            sla_compliance = summary.sla_compliance,
            issues = summary.total_issues,
            "campus health synchronized"
        );
        Ok(summary)
    }

    pub async fn report_issue(
        &self,
        new_issue: NewIssue,
        actor: &Actor,
    ) -> SyncResult<(Issue, HealthSummary)> {
        let title = new_issue.title.trim();
        if title.is_empty() {
            return Err(SyncError::MissingTitle);
        }

        // Fail before writing anything if the campus is unknown.
        self.store.get_campus(new_issue.campus_id).await?;

        let now = Utc::now();
        let severity = Severity::from_optional(new_issue.severity.as_deref());
        let issue = Issue {
            id: Uuid::new_v4(),
            campus_id: new_issue.campus_id,
            title: title.to_string(),
            description: new_issue.description,
            reported_by: new_issue
                .reported_by
                .unwrap_or_else(|| "Anonymous User".to_string()),
            severity: Some(
                new_issue
                    .severity
                    .unwrap_or_else(|| severity.as_str().to_string()),
            ),
            status: Some(STATUS_OPEN.to_string()),
            created_at: now,
            resolved_at: None,
            sla_deadline: Some(sla::sla_deadline(severity, now)),
            sla_status: Some(SlaStatus::WithinSla),
        };

        let issue = self.store.insert_issue(issue).await?;
        self.record(issue.id, "CREATED", "Incident reported and logged in system.")
            .await?;
        self.audit(
            AuditAction::IssueCreated,
            &issue,
            actor,
            None,
            Some(format!("{severity} issue reported")),
            now,
        )
        .await?;
        info!(issue_id = %issue.id, campus_id = %issue.campus_id, %severity, actor = %actor.id, "issue reported");

        let summary = self.sync_campus(issue.campus_id).await?;
        Ok((issue, summary))
    }

    pub async fn update_status(
        &self,
        issue_id: Uuid,
        status: &str,
        message: Option<String>,
        actor: &Actor,
    ) -> SyncResult<HealthSummary> {
        let status = status.trim().to_ascii_lowercase();
        let default_message = match status.as_str() {
            STATUS_ESCALATED => "Issue escalated to senior management.",
            STATUS_ACTIONED => "Field unit deployed; taking corrective action.",
            _ => return Err(SyncError::InvalidStatus(status.clone())),
        };

        let issue = self.store.get_issue(issue_id).await?;
        if issue.is_resolved() {
            return Err(SyncError::AlreadyResolved(issue_id));
        }

        // The guard catches a resolution that landed after the read above.
        if !self.store.update_status(issue_id, &status).await? {
            return Err(SyncError::AlreadyResolved(issue_id));
        }
        let message = message.unwrap_or_else(|| default_message.to_string());
        self.record(issue_id, &status.to_ascii_uppercase(), &message)
            .await?;
        let updated = self.store.get_issue(issue_id).await?;
        self.audit(
            AuditAction::StatusUpdated,
            &updated,
            actor,
            Some(AuditState::of(&issue)),
            Some(message),
            Utc::now(),
        )
        .await?;
        info!(%issue_id, previous = ?issue.status, %status, actor = %actor.id, "issue status updated");

        self.sync_campus(issue.campus_id).await
    }

    pub async fn resolve_issue(&self, issue_id: Uuid, actor: &Actor) -> SyncResult<HealthSummary> {
        let issue = self.store.get_issue(issue_id).await?;
        if issue.is_resolved() {
            return Err(SyncError::AlreadyResolved(issue_id));
        }

        let resolved_at = Utc::now();
        let verdict = sla::assess_at_resolution(issue.sla_status, issue.sla_deadline, resolved_at);
        if !self
            .store
            .mark_resolved(issue_id, resolved_at, verdict)
            .await?
        {
            return Err(SyncError::AlreadyResolved(issue_id));
        }

        // Re-read: a sweep may have flagged the breach since the first read.
        let resolved = self.store.get_issue(issue_id).await?;
        let final_sla = resolved.sla_status.unwrap_or(verdict);
        let message = format!(
            "Issue verified and marked as resolved. SLA {}",
            final_sla.as_str().to_ascii_uppercase()
        );
        self.record(issue_id, &STATUS_RESOLVED.to_ascii_uppercase(), &message)
            .await?;
        self.audit(
            AuditAction::IssueResolved,
            &resolved,
            actor,
            Some(AuditState::of(&issue)),
            Some(message),
            resolved_at,
        )
        .await?;
        info!(%issue_id, sla_status = %final_sla, actor = %actor.id, "issue resolved");

        self.sync_campus(issue.campus_id).await
    }

    /// Flags every overdue open issue as breached, then resyncs each affected
    /// campus once.
    pub async fn sweep_sla(&self) -> SyncResult<SweepOutcome> {
        let candidates = self.store.sweep_candidates(Utc::now()).await?;
        self.escalate_overdue(&candidates).await
    }

    /// Every campus with a flipped issue is resynced even when some writes
    /// fail; the first failure is returned afterwards.
    async fn escalate_overdue(&self, candidates: &[Issue]) -> SyncResult<SweepOutcome> {
        let actor = Actor::sla_engine();
        let mut campuses = BTreeSet::new();
        let mut breached = 0;
        let mut first_error: Option<SyncError> = None;

        for issue in candidates {
            match self.store.mark_breached(issue.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(issue_id = %issue.id, "issue changed since the sweep read it, skipping");
                    continue;
                }
                Err(err) => {
                    warn!(issue_id = %issue.id, %err, "failed to flag sla breach");
                    first_error.get_or_insert(err.into());
                    continue;
                }
            }
            campuses.insert(issue.campus_id);
            breached += 1;
            warn!(issue_id = %issue.id, campus_id = %issue.campus_id, "sla breached, issue escalated");

            let escalated = Issue {
                status: Some(STATUS_ESCALATED.to_string()),
                sla_status: Some(SlaStatus::Breached),
                ..issue.clone()
            };
            let written = match self
                .record(issue.id, &STATUS_ESCALATED.to_ascii_uppercase(), BREACH_MESSAGE)
                .await
            {
                Ok(()) => {
                    self.audit(
                        AuditAction::StatusUpdated,
                        &escalated,
                        &actor,
                        Some(AuditState::of(issue)),
                        Some(BREACH_MESSAGE.to_string()),
                        Utc::now(),
                    )
                    .await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                warn!(issue_id = %issue.id, %err, "failed to record sla breach history");
                first_error.get_or_insert(err);
            }
        }

        for campus_id in &campuses {
            match self.sync_campus(*campus_id).await {
                Ok(_) => {}
                // An orphaned issue must not stop the rest of the sweep.
                Err(SyncError::Store(StoreError::CampusNotFound(_))) => {}
                Err(err) => {
                    warn!(%campus_id, %err, "failed to resync campus after sla sweep");
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(
            processed = candidates.len(),
            breached,
            campuses = campuses.len(),
            "sla sweep finished"
        );
        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(SweepOutcome {
            processed: candidates.len(),
            breached,
            campuses: campuses.into_iter().collect(),
        })
    }

    async fn record(&self, issue_id: Uuid, status: &str, message: &str) -> SyncResult<()> {
        self.store
            .append_timeline(TimelineEntry {
                issue_id,
                status: status.to_string(),
                message: message.to_string(),
                recorded_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    async fn audit(
        &self,
        action: AuditAction,
        issue: &Issue,
        actor: &Actor,
        previous: Option<AuditState>,
        message: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> SyncResult<()> {
        self.store
            .append_audit(AuditEntry {
                issue_id: issue.id,
                action,
                actor: actor.clone(),
                previous,
                new: AuditState::of(issue),
                message,
                recorded_at,
            })
            .await?;
        Ok(())
    }
}
