use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health;
use crate::models::{Campus, HealthSummary, Issue, SeverityBreakdown};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    pub total_campuses: usize,
    pub total_issues: usize,
    pub resolved_issues: usize,
    pub resolution_rate: u8,
    /// Mean of cached campus scores; campuses never synced are skipped.
    pub average_health: u8,
    pub breakdown: SeverityBreakdown,
}

pub fn global_stats(campuses: &[Campus], issues: &[Issue]) -> GlobalStats {
    let resolved = issues.iter().filter(|issue| issue.is_resolved()).count();
    let resolution_rate = if issues.is_empty() {
        100
    } else {
        ((resolved as f64 / issues.len() as f64) * 100.0).round() as u8
    };

    let scores: Vec<f64> = campuses
        .iter()
        .filter_map(|campus| campus.health_summary.as_ref())
        .map(|summary| summary.score as f64)
        .collect();
    let average_health = if scores.is_empty() {
        100
    } else {
        (scores.iter().sum::<f64>() / scores.len() as f64).round() as u8
    };

    let mut breakdown = SeverityBreakdown::default();
    for issue in issues {
        breakdown.record(issue.severity());
    }

    GlobalStats {
        total_campuses: campuses.len(),
        total_issues: issues.len(),
        resolved_issues: resolved,
        resolution_rate,
        average_health,
        breakdown,
    }
}

pub fn build_report(
    campus: &Campus,
    summary: &HealthSummary,
    issues: &[Issue],
    now: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Campus Health Report: {}", campus.name);
    let _ = writeln!(
        output,
        "Generated {} for {}",
        now.format("%Y-%m-%d %H:%M UTC"),
        if campus.location.is_empty() {
            "unknown location"
        } else {
            campus.location.as_str()
        }
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Health");
    let _ = writeln!(output, "- Score: {} ({})", summary.score, summary.trend);
    let _ = writeln!(output, "- SLA compliance: {}%", summary.sla_compliance);
    let _ = writeln!(
        output,
        "- Resolved: {} of {} ({}%)",
        summary.resolved_issues, summary.total_issues, summary.resolved_percentage
    );
    let _ = writeln!(output, "- Penalty impact: {}", summary.impact);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Severity Mix");
    let mix = &summary.severity_breakdown;
    let _ = writeln!(
        output,
        "- critical: {}\n- high: {}\n- medium: {}\n- low: {}",
        mix.critical, mix.high, mix.medium, mix.low
    );

    let breached: Vec<&Issue> = issues
        .iter()
        .filter(|issue| health::is_breached(issue, now))
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## SLA Breaches");

    if breached.is_empty() {
        let _ = writeln!(output, "No SLA breaches recorded.");
    } else {
        for issue in breached {
            let _ = writeln!(
                output,
                "- [{}] {} ({})",
                issue.severity(),
                issue.title,
                issue.status.as_deref().unwrap_or("open")
            );
        }
    }

    let mut open: Vec<&Issue> = issues.iter().filter(|issue| !issue.is_resolved()).collect();
    open.sort_by(|a, b| {
        health::issue_penalty(b, now)
            .partial_cmp(&health::issue_penalty(a, now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Heaviest Open Issues");

    if open.is_empty() {
        let _ = writeln!(output, "No open issues.");
    } else {
        for issue in open.iter().take(10) {
            let _ = writeln!(
                output,
                "- [{}] {} reported by {} on {} (penalty {:.0})",
                issue.severity(),
                issue.title,
                issue.reported_by,
                issue.created_at.format("%Y-%m-%d %H:%M"),
                health::issue_penalty(issue, now)
            );
        }
    }

    output
}
