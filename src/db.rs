use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Actor, AuditAction, AuditEntry, AuditState, Campus, HealthSummary, Issue, Severity, SlaStatus,
    TimelineEntry, STATUS_ESCALATED, STATUS_OPEN, STATUS_RESOLVED,
};
use crate::sla;
use crate::store::{CampusStore, IssueStore};

const ISSUE_COLUMNS: &str = "id, campus_id, title, description, reported_by, severity, status, \
     created_at, resolved_at, sla_deadline, sla_status";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Fixed ids keep re-seeding idempotent.
const SEED_CAMPUSES: [(&str, &str, &str); 3] = [
    (
        "8b1e4c02-6f3a-4d91-a7c5-52e0b9d3f184",
        "Northgate Primary",
        "Northgate, Ward 4",
    ),
    (
        "e47a9d15-0b6c-4f28-9e3d-a1c86f7b2059",
        "Riverside Secondary",
        "Riverside, Ward 9",
    ),
    (
        "5fc3b870-d29e-4a14-8b06-7e1f34ca96d8",
        "Hillcrest Technical College",
        "Hillcrest, Ward 2",
    ),
];

/// Demo campuses with a spread of open, overdue and resolved issues.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let campuses = SEED_CAMPUSES
        .iter()
        .map(|(id, name, location)| -> anyhow::Result<(Uuid, &str, &str)> {
            Ok((Uuid::parse_str(id)?, *name, *location))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    for (id, name, location) in &campuses {
        sqlx::query(
            r#"
            INSERT INTO campus_health.campuses (id, name, location)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, location = EXCLUDED.location
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(location)
        .execute(pool)
        .await?;
    }

    let now = Utc::now();
    let issues = vec![
        (
            "seed-001",
            campuses[0].0,
            "Broken window in classroom 2B",
            "low",
            Duration::hours(5),
            false,
        ),
        (
            "seed-002",
            campuses[0].0,
            "No running water in east block",
            "critical",
            Duration::minutes(95),
            false,
        ),
        (
            "seed-003",
            campuses[1].0,
            "Flickering corridor lights",
            "medium",
            Duration::hours(3),
            false,
        ),
        (
            "seed-004",
            campuses[1].0,
            "Roof leak above library",
            "high",
            Duration::hours(6),
            true,
        ),
        (
            "seed-005",
            campuses[2].0,
            "Lab fume hood fault",
            "high",
            Duration::hours(2),
            true,
        ),
    ];

    for (source_key, campus_id, title, severity, age, resolved) in issues {
        let created_at = now - age;
        let deadline = sla::sla_deadline(Severity::parse_lenient(severity), created_at);
        let (status, resolved_at, sla_status) = if resolved {
            let resolved_at = created_at + Duration::minutes(45);
            let verdict = sla::assess_at_resolution(None, Some(deadline), resolved_at);
            (STATUS_RESOLVED, Some(resolved_at), verdict)
        } else {
            (STATUS_OPEN, None, SlaStatus::WithinSla)
        };

        sqlx::query(
            r#"
            INSERT INTO campus_health.issues
            (id, campus_id, title, description, reported_by, severity, status,
             created_at, resolved_at, sla_deadline, sla_status, source_key)
            VALUES ($1, $2, $3, '', 'Seed Data', $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(campus_id)
        .bind(title)
        .bind(severity)
        .bind(status)
        .bind(created_at)
        .bind(resolved_at)
        .bind(deadline)
        .bind(sla_status.as_str())
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn map_issue(row: &PgRow) -> StoreResult<Issue> {
    let sla_status: Option<String> = row.try_get("sla_status")?;
    Ok(Issue {
        id: row.try_get("id")?,
        campus_id: row.try_get("campus_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        reported_by: row.try_get("reported_by")?,
        severity: row.try_get("severity")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
        sla_deadline: row.try_get("sla_deadline")?,
        sla_status: sla_status.as_deref().and_then(SlaStatus::parse_lenient),
    })
}

fn map_campus(row: &PgRow) -> StoreResult<Campus> {
    let id: Uuid = row.try_get("id")?;
    let raw_summary: Option<serde_json::Value> = row.try_get("health_summary")?;

    // A stale or hand-edited cache is dropped rather than failing the campus.
    let health_summary = raw_summary.and_then(|value| {
        serde_json::from_value::<HealthSummary>(value)
            .map_err(|err| {
                warn!(campus_id = %id, %err, "ignoring unreadable cached health summary")
            })
            .ok()
    });

    Ok(Campus {
        id,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        health_summary,
        last_health_update: row.try_get("last_health_update")?,
    })
}

fn map_audit(row: &PgRow) -> StoreResult<AuditEntry> {
    let action: String = row.try_get("action")?;
    let previous_status: Option<String> = row.try_get("previous_status")?;
    let previous_sla: Option<String> = row.try_get("previous_sla_status")?;
    let new_sla: Option<String> = row.try_get("new_sla_status")?;
    let created = action == AuditAction::IssueCreated.as_str();

    Ok(AuditEntry {
        issue_id: row.try_get("issue_id")?,
        // Unknown labels only come from hand edits; treat them as status changes.
        action: AuditAction::parse(&action).unwrap_or(AuditAction::StatusUpdated),
        actor: Actor::new(
            row.try_get::<String, _>("actor_id")?,
            row.try_get::<String, _>("actor_role")?,
        ),
        previous: (!created).then(|| AuditState {
            status: previous_status,
            sla_status: previous_sla.as_deref().and_then(SlaStatus::parse_lenient),
        }),
        new: AuditState {
            status: row.try_get("new_status")?,
            sla_status: new_sla.as_deref().and_then(SlaStatus::parse_lenient),
        },
        message: row.try_get("message")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

impl PgStore {
    /// Turns the row count of a guarded UPDATE into applied / skipped, telling
    /// a failed guard apart from a missing issue.
    async fn guarded(&self, rows_affected: u64, issue_id: Uuid) -> StoreResult<bool> {
        if rows_affected > 0 {
            return Ok(true);
        }
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM campus_health.issues WHERE id = $1)")
                .bind(issue_id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::IssueNotFound(issue_id))
        }
    }
}

#[async_trait]
impl IssueStore for PgStore {
    async fn insert_issue(&self, issue: Issue) -> StoreResult<Issue> {
        sqlx::query(
            r#"
            INSERT INTO campus_health.issues
            (id, campus_id, title, description, reported_by, severity, status,
             created_at, resolved_at, sla_deadline, sla_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(issue.id)
        .bind(issue.campus_id)
        .bind(&issue.title)
        .bind(&issue.description)
        .bind(&issue.reported_by)
        .bind(&issue.severity)
        .bind(&issue.status)
        .bind(issue.created_at)
        .bind(issue.resolved_at)
        .bind(issue.sla_deadline)
        .bind(issue.sla_status.map(|status| status.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(issue)
    }

    async fn get_issue(&self, issue_id: Uuid) -> StoreResult<Issue> {
        let query = format!("SELECT {ISSUE_COLUMNS} FROM campus_health.issues WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(issue_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::IssueNotFound(issue_id))?;
        map_issue(&row)
    }

    async fn issues_for_campus(&self, campus_id: Uuid) -> StoreResult<Vec<Issue>> {
        let query = format!(
            "SELECT {ISSUE_COLUMNS} FROM campus_health.issues \
             WHERE campus_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query(&query)
            .bind(campus_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_issue).collect()
    }

    async fn all_issues(&self) -> StoreResult<Vec<Issue>> {
        let query = format!("SELECT {ISSUE_COLUMNS} FROM campus_health.issues ORDER BY created_at");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(map_issue).collect()
    }

    async fn update_status(&self, issue_id: Uuid, status: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campus_health.issues
            SET status = $2
            WHERE id = $1
              AND lower(coalesce(status, 'open')) <> 'resolved'
            "#,
        )
        .bind(issue_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        self.guarded(result.rows_affected(), issue_id).await
    }

    async fn mark_resolved(
        &self,
        issue_id: Uuid,
        resolved_at: DateTime<Utc>,
        sla_status: SlaStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campus_health.issues
            SET status = $2,
                resolved_at = $3,
                sla_status = CASE WHEN sla_status = 'breached' THEN 'breached' ELSE $4 END
            WHERE id = $1
              AND lower(coalesce(status, 'open')) <> 'resolved'
            "#,
        )
        .bind(issue_id)
        .bind(STATUS_RESOLVED)
        .bind(resolved_at)
        .bind(sla_status.as_str())
        .execute(&self.pool)
        .await?;
        self.guarded(result.rows_affected(), issue_id).await
    }

    async fn mark_breached(&self, issue_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campus_health.issues
            SET status = $2, sla_status = $3
            WHERE id = $1
              AND lower(coalesce(status, 'open')) <> 'resolved'
              AND sla_status = 'within_sla'
            "#,
        )
        .bind(issue_id)
        .bind(STATUS_ESCALATED)
        .bind(SlaStatus::Breached.as_str())
        .execute(&self.pool)
        .await?;
        self.guarded(result.rows_affected(), issue_id).await
    }

    async fn sweep_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Issue>> {
        let query = format!(
            "SELECT {ISSUE_COLUMNS} FROM campus_health.issues \
             WHERE lower(coalesce(status, 'open')) <> 'resolved' \
             AND sla_status = 'within_sla' \
             AND sla_deadline < $1"
        );
        let rows = sqlx::query(&query).bind(now).fetch_all(&self.pool).await?;
        let issues = rows.iter().map(map_issue).collect::<StoreResult<Vec<_>>>()?;
        // SQL narrows the scan; the shared rule stays authoritative.
        Ok(issues
            .into_iter()
            .filter(|issue| sla::is_sweep_candidate(issue, now))
            .collect())
    }

    async fn append_timeline(&self, entry: TimelineEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO campus_health.issue_timeline (issue_id, status, message, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.issue_id)
        .bind(&entry.status)
        .bind(&entry.message)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn timeline_for_issue(&self, issue_id: Uuid) -> StoreResult<Vec<TimelineEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT issue_id, status, message, recorded_at
            FROM campus_health.issue_timeline
            WHERE issue_id = $1
            ORDER BY recorded_at, id
            "#,
        )
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<TimelineEntry> {
                Ok(TimelineEntry {
                    issue_id: row.try_get("issue_id")?,
                    status: row.try_get("status")?,
                    message: row.try_get("message")?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    async fn append_audit(&self, entry: AuditEntry) -> StoreResult<()> {
        let previous = entry.previous.clone().unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO campus_health.issue_audit
            (issue_id, action, actor_id, actor_role, previous_status, previous_sla_status,
             new_status, new_sla_status, message, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.issue_id)
        .bind(entry.action.as_str())
        .bind(&entry.actor.id)
        .bind(&entry.actor.role)
        .bind(&previous.status)
        .bind(previous.sla_status.map(|status| status.as_str()))
        .bind(&entry.new.status)
        .bind(entry.new.sla_status.map(|status| status.as_str()))
        .bind(&entry.message)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_for_issue(&self, issue_id: Uuid) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT issue_id, action, actor_id, actor_role, previous_status, previous_sla_status,
                   new_status, new_sla_status, message, recorded_at
            FROM campus_health.issue_audit
            WHERE issue_id = $1
            ORDER BY recorded_at, id
            "#,
        )
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_audit).collect()
    }
}

#[async_trait]
impl CampusStore for PgStore {
    async fn insert_campus(&self, campus: Campus) -> StoreResult<Campus> {
        sqlx::query(
            r#"
            INSERT INTO campus_health.campuses (id, name, location)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(campus.id)
        .bind(&campus.name)
        .bind(&campus.location)
        .execute(&self.pool)
        .await?;
        Ok(campus)
    }

    async fn get_campus(&self, campus_id: Uuid) -> StoreResult<Campus> {
        let row = sqlx::query(
            r#"
            SELECT id, name, location, health_summary, last_health_update
            FROM campus_health.campuses
            WHERE id = $1
            "#,
        )
        .bind(campus_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::CampusNotFound(campus_id))?;
        map_campus(&row)
    }

    async fn list_campuses(&self) -> StoreResult<Vec<Campus>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, location, health_summary, last_health_update
            FROM campus_health.campuses
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_campus).collect()
    }

    async fn save_health(
        &self,
        campus_id: Uuid,
        summary: &HealthSummary,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE campus_health.campuses
            SET health_summary = $2, last_health_update = $3
            WHERE id = $1
            "#,
        )
        .bind(campus_id)
        .bind(Json(summary))
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::CampusNotFound(campus_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn seed_campus_ids_are_valid_and_distinct() {
        let ids: HashSet<Uuid> = SEED_CAMPUSES
            .iter()
            .map(|(id, _, _)| Uuid::parse_str(id).unwrap())
            .collect();
        assert_eq!(ids.len(), SEED_CAMPUSES.len());
        assert!(ids.iter().all(|id| id.get_version_num() == 4));
    }
}
