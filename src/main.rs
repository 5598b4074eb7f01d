use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

mod config;
mod db;
mod error;
mod health;
mod models;
mod report;
mod sla;
mod store;
mod sync;
mod telemetry;

use crate::models::{Actor, Campus, NewIssue};
use crate::store::{CampusStore, IssueStore};
use crate::sync::HealthSync;

#[derive(Parser)]
#[command(name = "campus-health")]
#[command(about = "Campus operations health and SLA tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Who is making the change, for the audit trail.
#[derive(Args)]
struct ActorArgs {
    #[arg(long = "actor-id", default_value = "anonymous")]
    id: String,
    #[arg(long = "actor-role", default_value = "anonymous")]
    role: String,
}

impl From<ActorArgs> for Actor {
    fn from(args: ActorArgs) -> Self {
        Actor::new(args.id, args.role)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo campuses and issues
    Seed,
    /// Register a campus
    AddCampus {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        location: String,
    },
    /// Report a facility issue and refresh campus health
    ReportIssue {
        #[arg(long)]
        campus: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// low, medium, high or critical
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        reported_by: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Move an issue to escalated or actioned
    SetStatus {
        #[arg(long)]
        issue: Uuid,
        #[arg(long)]
        status: String,
        #[arg(long)]
        message: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Resolve an issue and record the final SLA verdict
    Resolve {
        #[arg(long)]
        issue: Uuid,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Escalate open issues past their SLA deadline
    SlaSweep,
    /// Recompute and cache a campus health summary
    Health {
        #[arg(long)]
        campus: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Print the timeline of an issue
    Timeline {
        #[arg(long)]
        issue: Uuid,
    },
    /// Print the audit trail of an issue
    Audit {
        #[arg(long)]
        issue: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Write a markdown health report for a campus
    Report {
        #[arg(long)]
        campus: Uuid,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Aggregate statistics across every campus
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::AppConfig::from_env().context("failed to load configuration")?;
    telemetry::init(&config.log_level)?;

    let store = db::PgStore::connect(&config).await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(store.pool()).await?;
            let sync = HealthSync::new(store);
            for campus in sync.store().list_campuses().await? {
                sync.sync_campus(campus.id).await?;
            }
            println!("Seed data inserted.");
        }
        Commands::AddCampus { name, location } => {
            let campus = store
                .insert_campus(Campus {
                    id: Uuid::new_v4(),
                    name,
                    location,
                    health_summary: None,
                    last_health_update: None,
                })
                .await?;
            println!("Campus {} registered as {}.", campus.name, campus.id);
        }
        Commands::ReportIssue {
            campus,
            title,
            description,
            severity,
            reported_by,
            actor,
        } => {
            let sync = HealthSync::new(store);
            let (issue, summary) = sync
                .report_issue(
                    NewIssue {
                        campus_id: campus,
                        title,
                        description,
                        reported_by,
                        severity,
                    },
                    &actor.into(),
                )
                .await?;
            println!(
                "Issue {} logged (SLA due {}). Campus score {} ({}).",
                issue.id,
                issue
                    .sla_deadline
                    .map(|deadline| deadline.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
                summary.score,
                summary.trend
            );
        }
        Commands::SetStatus {
            issue,
            status,
            message,
            actor,
        } => {
            let sync = HealthSync::new(store);
            let summary = sync
                .update_status(issue, &status, message, &actor.into())
                .await?;
            println!(
                "Issue {issue} updated. Campus score {} ({}).",
                summary.score, summary.trend
            );
        }
        Commands::Resolve { issue, actor } => {
            let sync = HealthSync::new(store);
            let summary = sync.resolve_issue(issue, &actor.into()).await?;
            println!(
                "Issue {issue} resolved. Campus score {} ({}).",
                summary.score, summary.trend
            );
        }
        Commands::SlaSweep => {
            let sync = HealthSync::new(store);
            let outcome = sync.sweep_sla().await?;
            println!(
                "Checked {} overdue issues, escalated {} across {} campuses.",
                outcome.processed,
                outcome.breached,
                outcome.campuses.len()
            );
        }
        Commands::Health { campus, json } => {
            let sync = HealthSync::new(store);
            let summary = sync.sync_campus(campus).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Score {} ({}), SLA compliance {}%, {} of {} issues resolved.",
                    summary.score,
                    summary.trend,
                    summary.sla_compliance,
                    summary.resolved_issues,
                    summary.total_issues
                );
            }
        }
        Commands::Timeline { issue } => {
            let entries = store.timeline_for_issue(issue).await?;
            if entries.is_empty() {
                println!("No timeline entries for this issue.");
                return Ok(());
            }
            for entry in entries {
                println!(
                    "- {} {}: {}",
                    entry.recorded_at.format("%Y-%m-%d %H:%M"),
                    entry.status,
                    entry.message
                );
            }
        }
        Commands::Audit { issue, json } => {
            let entries = store.audit_for_issue(issue).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("No audit records for this issue.");
                return Ok(());
            }
            for entry in entries {
                let previous = entry
                    .previous
                    .map(|state| {
                        format!(
                            "{}/{}",
                            state.status.as_deref().unwrap_or("-"),
                            state.sla_status.map(|sla| sla.as_str()).unwrap_or("-")
                        )
                    })
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "- {} {} by {} ({}): {} -> {}/{}",
                    entry.recorded_at.format("%Y-%m-%d %H:%M"),
                    entry.action,
                    entry.actor.id,
                    entry.actor.role,
                    previous,
                    entry.new.status.as_deref().unwrap_or("-"),
                    entry.new.sla_status.map(|sla| sla.as_str()).unwrap_or("-")
                );
            }
        }
        Commands::Report { campus, out } => {
            let sync = HealthSync::new(store);
            let summary = sync.sync_campus(campus).await?;
            let record = sync.store().get_campus(campus).await?;
            let issues = sync.store().issues_for_campus(campus).await?;
            let report = report::build_report(&record, &summary, &issues, Utc::now());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Stats { json } => {
            let campuses = store.list_campuses().await?;
            let issues = store.all_issues().await?;
            let stats = report::global_stats(&campuses, &issues);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "{} campuses, {} issues, {}% resolved, average health {}.",
                    stats.total_campuses,
                    stats.total_issues,
                    stats.resolution_rate,
                    stats.average_health
                );
            }
        }
    }

    Ok(())
}
