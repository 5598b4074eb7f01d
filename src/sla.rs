use chrono::{DateTime, Duration, Utc};

use crate::models::{Issue, Severity, SlaStatus};

/// Time allowed to resolve an issue of the given severity.
pub fn sla_window(severity: Severity) -> Duration {
    match severity {
        Severity::Critical => Duration::hours(1),
        Severity::High => Duration::hours(4),
        Severity::Medium => Duration::hours(12),
        Severity::Low => Duration::hours(48),
    }
}

pub fn sla_deadline(severity: Severity, created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + sla_window(severity)
}

/// Final SLA verdict recorded when an issue is resolved. A breach is sticky.
pub fn assess_at_resolution(
    current: Option<SlaStatus>,
    deadline: Option<DateTime<Utc>>,
    resolved_at: DateTime<Utc>,
) -> SlaStatus {
    if current == Some(SlaStatus::Breached) {
        return SlaStatus::Breached;
    }

    match deadline {
        Some(deadline) if resolved_at > deadline => SlaStatus::Breached,
        _ => SlaStatus::Met,
    }
}

/// Open issues still marked within SLA whose deadline has already passed.
pub fn is_sweep_candidate(issue: &Issue, now: DateTime<Utc>) -> bool {
    !issue.is_resolved()
        && issue.sla_status == Some(SlaStatus::WithinSla)
        && issue.sla_deadline.is_some_and(|deadline| now > deadline)
}
