// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use cadence::alerts::AlertBus;
use cadence::config::{EngineConfig, OrchestratorConfig};
use cadence::orchestrator::Orchestrator;
use cadence::reservation::sweep;
use cadence::scheduler::{ScheduleState, Scheduler};
use cadence::tasks::TaskManager;
use cadence::tasks::metrics::EngineMetrics;
use cadence::types::{Item, RestrictionSet, ScheduleRequest};

#[derive(Parser)]
#[command(name = "cadence", about = "Content scheduling engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule a batch of recipients through the worker pool
    Run {
        /// JSON file with an array of schedule requests
        #[arg(long)]
        requests: PathBuf,
        /// JSON file with the item catalog
        #[arg(long)]
        items: PathBuf,
        /// JSON file with restriction sets
        #[arg(long)]
        restrictions: Option<PathBuf>,
    },
    /// Build and commit a plan for a single recipient
    Schedule {
        /// JSON file with one schedule request
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        restrictions: Option<PathBuf>,
        /// Build the plan and print it without committing
        #[arg(long)]
        dry_run: bool,
    },
    /// Release expired reservations
    Sweep,
    /// Refresh the saturation snapshot for one recipient
    Snapshot {
        #[arg(long)]
        recipient: String,
    },
    /// Print the composite engagement report for one recipient
    Report {
        #[arg(long)]
        recipient: String,
    },
    /// Run the background task loops until interrupted
    Daemon,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    let pool = cadence::store::connect(&config.database_url, config.sqlite_max_connections).await?;
    let alerts = AlertBus::default();
    let scheduler = Arc::new(Scheduler::new(pool.clone(), config, alerts.clone()));

    match cli.command {
        Command::Run {
            requests,
            items,
            restrictions,
        } => {
            let requests: Vec<ScheduleRequest> = read_json(&requests)?;
            let items: Vec<Item> = read_json(&items)?;
            let restrictions: Vec<RestrictionSet> = match restrictions {
                Some(path) => read_json(&path)?,
                None => Vec::new(),
            };
            info!(
                recipients = requests.len(),
                items = items.len(),
                "starting orchestrated run"
            );

            let orchestrator = Orchestrator::new(
                scheduler,
                OrchestratorConfig::from_env(),
                alerts,
            );
            let report = orchestrator
                .run(requests, Arc::new(items), Arc::new(restrictions))
                .await;

            println!(
                "run finished: {} ok, {} partial, {} failed, {} skipped in {:?}",
                report.succeeded.len(),
                report.partial.len(),
                report.failed.len(),
                report.skipped.len(),
                report.elapsed
            );
            for (recipient, reason) in &report.failed {
                warn!(recipient_id = %recipient, reason, "recipient failed");
            }
        }
        Command::Schedule {
            request,
            items,
            restrictions,
            dry_run,
        } => {
            let request: ScheduleRequest = read_json(&request)?;
            let items: Vec<Item> = read_json(&items)?;
            let restrictions: Vec<RestrictionSet> = match restrictions {
                Some(path) => read_json(&path)?,
                None => Vec::new(),
            };

            let plan = scheduler.build_plan(&request, &items, &restrictions).await?;
            if dry_run {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }

            let outcome = scheduler.commit(&plan).await?;
            println!(
                "schedule {} for {}: {} ({} slots, {} rejected)",
                outcome.plan.schedule_id,
                outcome.plan.recipient_id,
                outcome.state.as_str(),
                outcome.plan.slots.len(),
                outcome.rejected.len()
            );
            if outcome.state == ScheduleState::Failed {
                anyhow::bail!("batch rolled back");
            }
        }
        Command::Sweep => {
            let swept = sweep::sweep_expired(&pool).await?;
            println!("released {swept} expired reservations");
        }
        Command::Snapshot { recipient } => {
            let snapshot = scheduler.monitor().evaluate(&recipient).await?;
            scheduler.alert_on_snapshot(&snapshot);
            println!(
                "{}: zone={} score={:.1} decline_days={} predicted={}",
                snapshot.recipient_id,
                snapshot.zone,
                snapshot.exhaustion_score,
                snapshot.consecutive_decline_days,
                snapshot.predicted_saturation
            );
        }
        Command::Report { recipient } => {
            let stats = cadence::stats::StatsStore::new(pool.clone());
            let agg = stats.aggregate_for_recipient(&recipient).await?;

            let row = sqlx::query(
                r#"
                SELECT COUNT(*) AS total,
                       SUM(CASE WHEN state IN ('done', 'partial') THEN 1 ELSE 0 END) AS executed
                FROM schedule_plans
                WHERE recipient_id = ?
                "#,
            )
            .bind(&recipient)
            .fetch_one(&pool)
            .await?;
            let total: i64 = sqlx::Row::get(&row, "total");
            let executed: i64 = sqlx::Row::get::<Option<i64>, _>(&row, "executed").unwrap_or(0);

            let report = cadence::saturation::engagement::score(
                &cadence::saturation::engagement::EngagementInputs {
                    revenue_per_send: agg.revenue_per_send(),
                    conversion_rate: agg.conversion_rate(),
                    execution_rate: if total > 0 {
                        executed as f64 / total as f64
                    } else {
                        1.0
                    },
                    diversity: if agg.sends() > 0 {
                        (agg.distinct_items as f64 / agg.sends() as f64).min(1.0)
                    } else {
                        0.0
                    },
                },
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Daemon => {
            let metrics = Arc::new(EngineMetrics::new());
            let mut manager = TaskManager::new(pool, scheduler, metrics);
            manager.start();
            info!("daemon running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            manager.shutdown().await;
        }
    }

    Ok(())
}
