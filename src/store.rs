use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{AuditEntry, Campus, HealthSummary, Issue, SlaStatus, TimelineEntry};

#[cfg(test)]
pub use memory::MemoryStore;

/// Issue persistence. Guarded writes return `Ok(false)` when the issue exists
/// but no longer satisfies the precondition, and `IssueNotFound` when it is
/// gone.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn insert_issue(&self, issue: Issue) -> StoreResult<Issue>;
    async fn get_issue(&self, issue_id: Uuid) -> StoreResult<Issue>;
    async fn issues_for_campus(&self, campus_id: Uuid) -> StoreResult<Vec<Issue>>;
    async fn all_issues(&self) -> StoreResult<Vec<Issue>>;
    /// Only applies to unresolved issues.
    async fn update_status(&self, issue_id: Uuid, status: &str) -> StoreResult<bool>;
    /// Only applies to unresolved issues; an existing breach is kept.
    async fn mark_resolved(
        &self,
        issue_id: Uuid,
        resolved_at: DateTime<Utc>,
        sla_status: SlaStatus,
    ) -> StoreResult<bool>;
    /// Flags a breach and escalates the issue. Only applies to unresolved
    /// issues still within SLA.
    async fn mark_breached(&self, issue_id: Uuid) -> StoreResult<bool>;
    async fn sweep_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Issue>>;
    async fn append_timeline(&self, entry: TimelineEntry) -> StoreResult<()>;
    async fn timeline_for_issue(&self, issue_id: Uuid) -> StoreResult<Vec<TimelineEntry>>;
    async fn append_audit(&self, entry: AuditEntry) -> StoreResult<()>;
    async fn audit_for_issue(&self, issue_id: Uuid) -> StoreResult<Vec<AuditEntry>>;
}

#[async_trait]
pub trait CampusStore: Send + Sync {
    async fn insert_campus(&self, campus: Campus) -> StoreResult<Campus>;
    async fn get_campus(&self, campus_id: Uuid) -> StoreResult<Campus>;
    async fn list_campuses(&self) -> StoreResult<Vec<Campus>>;
    /// Merge write: only the cached summary and its timestamp change.
    async fn save_health(
        &self,
        campus_id: Uuid,
        summary: &HealthSummary,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

/// In-process store used by the trigger tests.
#[cfg(test)]
mod memory {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::sync::RwLock;
    use uuid::Uuid;

    use super::{CampusStore, IssueStore};
    use crate::error::{StoreError, StoreResult};
    use crate::models::{
        AuditEntry, Campus, HealthSummary, Issue, SlaStatus, TimelineEntry, STATUS_ESCALATED,
        STATUS_RESOLVED,
    };
    use crate::sla;

    #[derive(Default)]
    struct MemoryState {
        campuses: HashMap<Uuid, Campus>,
        issues: HashMap<Uuid, Issue>,
        timeline: Vec<TimelineEntry>,
        audit: Vec<AuditEntry>,
        broken_issues: HashSet<Uuid>,
    }

    impl MemoryState {
        fn issue_mut(&mut self, issue_id: Uuid) -> StoreResult<&mut Issue> {
            if self.broken_issues.contains(&issue_id) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.issues
                .get_mut(&issue_id)
                .ok_or(StoreError::IssueNotFound(issue_id))
        }
    }

    #[derive(Default)]
    pub struct MemoryStore {
        state: RwLock<MemoryState>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every later write to this issue fail like a lost connection.
        pub async fn break_writes_to(&self, issue_id: Uuid) {
            self.state.write().await.broken_issues.insert(issue_id);
        }
    }

    #[async_trait]
    impl IssueStore for MemoryStore {
        async fn insert_issue(&self, issue: Issue) -> StoreResult<Issue> {
            let mut state = self.state.write().await;
            state.issues.insert(issue.id, issue.clone());
            Ok(issue)
        }

        async fn get_issue(&self, issue_id: Uuid) -> StoreResult<Issue> {
            self.state
                .read()
                .await
                .issues
                .get(&issue_id)
                .cloned()
                .ok_or(StoreError::IssueNotFound(issue_id))
        }

        async fn issues_for_campus(&self, campus_id: Uuid) -> StoreResult<Vec<Issue>> {
            let state = self.state.read().await;
            let mut issues: Vec<Issue> = state
                .issues
                .values()
                .filter(|issue| issue.campus_id == campus_id)
                .cloned()
                .collect();
            issues.sort_by_key(|issue| issue.created_at);
            Ok(issues)
        }

        async fn all_issues(&self) -> StoreResult<Vec<Issue>> {
            let mut issues: Vec<Issue> =
                self.state.read().await.issues.values().cloned().collect();
            issues.sort_by_key(|issue| issue.created_at);
            Ok(issues)
        }

        async fn update_status(&self, issue_id: Uuid, status: &str) -> StoreResult<bool> {
            let mut state = self.state.write().await;
            let issue = state.issue_mut(issue_id)?;
            if issue.is_resolved() {
                return Ok(false);
            }
            issue.status = Some(status.to_string());
            Ok(true)
        }

        async fn mark_resolved(
            &self,
            issue_id: Uuid,
            resolved_at: DateTime<Utc>,
            sla_status: SlaStatus,
        ) -> StoreResult<bool> {
            let mut state = self.state.write().await;
            let issue = state.issue_mut(issue_id)?;
            if issue.is_resolved() {
                return Ok(false);
            }
            issue.status = Some(STATUS_RESOLVED.to_string());
            issue.resolved_at = Some(resolved_at);
            if issue.sla_status != Some(SlaStatus::Breached) {
                issue.sla_status = Some(sla_status);
            }
            Ok(true)
        }

        async fn mark_breached(&self, issue_id: Uuid) -> StoreResult<bool> {
            let mut state = self.state.write().await;
            let issue = state.issue_mut(issue_id)?;
            if issue.is_resolved() || issue.sla_status != Some(SlaStatus::WithinSla) {
                return Ok(false);
            }
            issue.status = Some(STATUS_ESCALATED.to_string());
            issue.sla_status = Some(SlaStatus::Breached);
            Ok(true)
        }

        async fn sweep_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Issue>> {
            let state = self.state.read().await;
            Ok(state
                .issues
                .values()
                .filter(|issue| sla::is_sweep_candidate(issue, now))
                .cloned()
                .collect())
        }

        async fn append_timeline(&self, entry: TimelineEntry) -> StoreResult<()> {
            self.state.write().await.timeline.push(entry);
            Ok(())
        }

        async fn timeline_for_issue(&self, issue_id: Uuid) -> StoreResult<Vec<TimelineEntry>> {
            let state = self.state.read().await;
            Ok(state
                .timeline
                .iter()
                .filter(|entry| entry.issue_id == issue_id)
                .cloned()
                .collect())
        }

        async fn append_audit(&self, entry: AuditEntry) -> StoreResult<()> {
            self.state.write().await.audit.push(entry);
            Ok(())
        }

        async fn audit_for_issue(&self, issue_id: Uuid) -> StoreResult<Vec<AuditEntry>> {
            let state = self.state.read().await;
            Ok(state
                .audit
                .iter()
                .filter(|entry| entry.issue_id == issue_id)
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl CampusStore for MemoryStore {
        async fn insert_campus(&self, campus: Campus) -> StoreResult<Campus> {
            let mut state = self.state.write().await;
            state.campuses.insert(campus.id, campus.clone());
            Ok(campus)
        }

        async fn get_campus(&self, campus_id: Uuid) -> StoreResult<Campus> {
            self.state
                .read()
                .await
                .campuses
                .get(&campus_id)
                .cloned()
                .ok_or(StoreError::CampusNotFound(campus_id))
        }

        async fn list_campuses(&self) -> StoreResult<Vec<Campus>> {
            let mut campuses: Vec<Campus> =
                self.state.read().await.campuses.values().cloned().collect();
            campuses.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(campuses)
        }

        async fn save_health(
            &self,
            campus_id: Uuid,
            summary: &HealthSummary,
            updated_at: DateTime<Utc>,
        ) -> StoreResult<()> {
            let mut state = self.state.write().await;
            let campus = state
                .campuses
                .get_mut(&campus_id)
                .ok_or(StoreError::CampusNotFound(campus_id))?;
            campus.health_summary = Some(summary.clone());
            campus.last_health_update = Some(updated_at);
            Ok(())
        }
    }
}
