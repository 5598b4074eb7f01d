use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse. Anything unrecognized, padded values included,
    /// counts as medium.
    pub fn parse_lenient(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }

    pub fn from_optional(value: Option<&str>) -> Self {
        value.map(Self::parse_lenient).unwrap_or(Severity::Medium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    WithinSla,
    Met,
    Breached,
}

impl SlaStatus {
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "within_sla" => Some(SlaStatus::WithinSla),
            "met" => Some(SlaStatus::Met),
            "breached" => Some(SlaStatus::Breached),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlaStatus::WithinSla => "within_sla",
            SlaStatus::Met => "met",
            SlaStatus::Breached => "breached",
        }
    }
}

impl fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const STATUS_OPEN: &str = "open";
pub const STATUS_ACTIONED: &str = "actioned";
pub const STATUS_ESCALATED: &str = "escalated";
pub const STATUS_RESOLVED: &str = "resolved";

/// Statuses are free-form; only `resolved` (any case, no padding) closes an
/// issue.
pub fn is_resolved(status: Option<&str>) -> bool {
    status
        .map(|value| value.eq_ignore_ascii_case(STATUS_RESOLVED))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub campus_id: Uuid,
    pub title: String,
    pub description: String,
    pub reported_by: String,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub sla_status: Option<SlaStatus>,
}

impl Issue {
    pub fn severity(&self) -> Severity {
        Severity::from_optional(self.severity.as_deref())
    }

    pub fn is_resolved(&self) -> bool {
        is_resolved(self.status.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct NewIssue {
    pub campus_id: Uuid,
    pub title: String,
    pub description: String,
    pub reported_by: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl SeverityBreakdown {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
            Severity::Critical => self.critical += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub score: u8,
    pub trend: Trend,
    pub sla_compliance: u8,
    pub resolved_percentage: u8,
    pub total_issues: usize,
    pub resolved_issues: usize,
    pub open_issues: usize,
    pub breached_issues: usize,
    /// Rounded total penalty behind the score.
    pub impact: i64,
    pub severity_breakdown: SeverityBreakdown,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campus {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub health_summary: Option<HealthSummary>,
    pub last_health_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub issue_id: Uuid,
    pub status: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

/// What an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    IssueCreated,
    StatusUpdated,
    IssueResolved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::IssueCreated => "ISSUE_CREATED",
            AuditAction::StatusUpdated => "STATUS_UPDATED",
            AuditAction::IssueResolved => "ISSUE_RESOLVED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ISSUE_CREATED" => Some(AuditAction::IssueCreated),
            "STATUS_UPDATED" => Some(AuditAction::StatusUpdated),
            "ISSUE_RESOLVED" => Some(AuditAction::IssueResolved),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who triggered a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }

    /// The scheduled SLA sweep.
    pub fn sla_engine() -> Self {
        Self::new("SYSTEM_SLA_ENGINE", "system")
    }
}

/// Status and SLA state on one side of an audited change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditState {
    pub status: Option<String>,
    pub sla_status: Option<SlaStatus>,
}

impl AuditState {
    pub fn of(issue: &Issue) -> Self {
        Self {
            status: issue.status.clone(),
            sla_status: issue.sla_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub issue_id: Uuid,
    pub action: AuditAction,
    pub actor: Actor,
    /// `None` for creation.
    pub previous: Option<AuditState>,
    pub new: AuditState,
    pub message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_defaults_to_medium() {
        assert_eq!(Severity::parse_lenient("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse_lenient("Low"), Severity::Low);
        assert_eq!(Severity::parse_lenient(" low "), Severity::Medium);
        assert_eq!(Severity::parse_lenient("urgent"), Severity::Medium);
        assert_eq!(Severity::parse_lenient(""), Severity::Medium);
        assert_eq!(Severity::from_optional(None), Severity::Medium);
    }

    #[test]
    fn resolved_status_is_case_insensitive() {
        assert!(is_resolved(Some("Resolved")));
        assert!(is_resolved(Some("RESOLVED")));
        assert!(!is_resolved(Some("escalated")));
        assert!(!is_resolved(Some(" resolved")));
        assert!(!is_resolved(None));
    }

    #[test]
    fn sla_status_round_trips_through_labels() {
        assert_eq!(SlaStatus::parse_lenient("Breached"), Some(SlaStatus::Breached));
        assert_eq!(SlaStatus::parse_lenient("within_sla"), Some(SlaStatus::WithinSla));
        assert_eq!(SlaStatus::parse_lenient("late"), None);
    }

    #[test]
    fn audit_actions_keep_their_labels() {
        for action in [
            AuditAction::IssueCreated,
            AuditAction::StatusUpdated,
            AuditAction::IssueResolved,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                serde_json::json!(action.as_str())
            );
        }
        assert_eq!(AuditAction::parse("issue_created"), None);
    }

    #[test]
    fn summary_serializes_lowercase_trend() {
        let value = serde_json::to_value(Trend::Down).unwrap();
        assert_eq!(value, serde_json::json!("down"));
    }
}
