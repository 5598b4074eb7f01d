//! Campus health scoring.
//!
//! Open issues accumulate penalty with age and again when their SLA is
//! breached. Resolved issues keep the penalty they had at resolution time and
//! then decay with a ten minute half-life, so a fully resolved campus is back
//! at 100 within a couple of hours.

use chrono::{DateTime, Utc};

use crate::models::{HealthSummary, Issue, Severity, SeverityBreakdown, SlaStatus, Trend};

/// Score a campus starts from before any summary has been cached.
pub const DEFAULT_PREVIOUS_SCORE: u8 = 100;

/// Half-life of a resolved issue's penalty, in hours (ten minutes).
pub const RESOLVED_HALF_LIFE_HOURS: f64 = 1.0 / 6.0;

/// Decayed penalties below this are dropped to exactly zero.
pub const RESIDUE_FLOOR: f64 = 0.1;

pub fn base_penalty(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 40.0,
        Severity::High => 15.0,
        Severity::Medium => 5.0,
        Severity::Low => 1.0,
    }
}

pub fn breach_penalty(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 50.0,
        Severity::High => 30.0,
        Severity::Medium => 15.0,
        Severity::Low => 5.0,
    }
}

/// An issue is breached when flagged so, or when it is still open past its
/// deadline. Resolved issues rely on the flag set at resolution.
pub fn is_breached(issue: &Issue, now: DateTime<Utc>) -> bool {
    if issue.sla_status == Some(SlaStatus::Breached) {
        return true;
    }

    !issue.is_resolved() && issue.sla_deadline.is_some_and(|deadline| now > deadline)
}

/// Whole hours between two instants, never negative.
fn whole_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_hours().max(0) as f64
}

fn fractional_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds().max(0) as f64) / 3_600_000.0
}

pub fn decay_factor(hours_since_resolved: f64) -> f64 {
    0.5_f64.powf(hours_since_resolved.max(0.0) / RESOLVED_HALF_LIFE_HOURS)
}

/// Current penalty contributed by a single issue.
pub fn issue_penalty(issue: &Issue, now: DateTime<Utc>) -> f64 {
    let severity = issue.severity();
    let base = base_penalty(severity);

    if !issue.is_resolved() {
        let mut penalty = base + whole_hours(issue.created_at, now);
        if is_breached(issue, now) {
            penalty += breach_penalty(severity);
        }
        return penalty;
    }

    // Missing resolution time: treat as resolved just now, undecayed.
    let resolved_at = issue.resolved_at.unwrap_or(now);
    let was_breached = issue.sla_status == Some(SlaStatus::Breached);
    let at_resolution = base
        + whole_hours(issue.created_at, resolved_at)
        + if was_breached {
            breach_penalty(severity)
        } else {
            0.0
        };

    let decayed = at_resolution * decay_factor(fractional_hours(resolved_at, now));
    if decayed < RESIDUE_FLOOR {
        0.0
    } else {
        decayed
    }
}

pub fn trend_for(score: u8, previous_score: u8) -> Trend {
    match score.cmp(&previous_score) {
        std::cmp::Ordering::Greater => Trend::Up,
        std::cmp::Ordering::Less => Trend::Down,
        std::cmp::Ordering::Equal => Trend::Stable,
    }
}

fn percentage(part: usize, total: usize) -> u8 {
    ((part as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

pub fn compute_health(issues: &[Issue], previous_score: u8, now: DateTime<Utc>) -> HealthSummary {
    if issues.is_empty() {
        return HealthSummary {
            score: 100,
            trend: Trend::Stable,
            sla_compliance: 100,
            resolved_percentage: 100,
            total_issues: 0,
            resolved_issues: 0,
            open_issues: 0,
            breached_issues: 0,
            impact: 0,
            severity_breakdown: SeverityBreakdown::default(),
            last_updated: now,
        };
    }

    let total_penalty: f64 = issues.iter().map(|issue| issue_penalty(issue, now)).sum();
    let score = (100.0 - total_penalty).round().clamp(0.0, 100.0) as u8;

    // Breaches are counted in their own pass, not carried over from scoring.
    let breached = issues
        .iter()
        .filter(|issue| is_breached(issue, now))
        .count();

    let total = issues.len();
    let resolved = issues.iter().filter(|issue| issue.is_resolved()).count();

    let mut severity_breakdown = SeverityBreakdown::default();
    for issue in issues {
        severity_breakdown.record(issue.severity());
    }

    HealthSummary {
        score,
        trend: trend_for(score, previous_score),
        sla_compliance: percentage(total - breached, total),
        resolved_percentage: percentage(resolved, total),
        total_issues: total,
        resolved_issues: resolved,
        open_issues: total - resolved,
        breached_issues: breached,
        impact: total_penalty.round() as i64,
        severity_breakdown,
        last_updated: now,
    }
}

pub fn compute_health_now(issues: &[Issue], previous_score: u8) -> HealthSummary {
    compute_health(issues, previous_score, Utc::now())
}
