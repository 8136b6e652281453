/**
 * FLEET RECONCILER - Point d'entrée du réconciliateur d'inventaires
 *
 * RÔLE : Charge la config, installe les logs, construit les collaborateurs
 * (exports cloud et gestion de config, API monitoring), lance une passe puis
 * écrit les trois rapports CSV et le résumé du run.
 *
 * SORTIE : code non nul sur erreur fatale, avec le collaborateur et la phase
 * en cause dans le message.
 */

use anyhow::{Context, Result};
use fleet_kernel::clients::{HttpMonitoringClient, SnapshotCloudClient, SnapshotConfigClient};
use fleet_kernel::config::{load_config, ReconcilerConfig};
use fleet_kernel::coverage::monitored_nodes;
use fleet_kernel::reconciler::{Collaborators, ReconcileOutcome, Reconciler, ReconcilerSettings};
use fleet_kernel::report::{host_rows, CsvReportWriter};
use fleet_kernel::stats::RunTracker;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(cfg: &ReconcilerConfig) -> Result<()> {
    // RUST_LOG prime sur log.level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.level));

    match &cfg.log.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn write_reports(cfg: &ReconcilerConfig, outcome: &ReconcileOutcome) -> Result<()> {
    let writer = CsvReportWriter::new(&cfg.reports.dir);
    writer
        .write(&cfg.reports.hosts, &host_rows(&outcome.registry))
        .context("Failed to write host report")?;
    writer
        .write(&cfg.reports.config_orphans, &outcome.config_report)
        .context("Failed to write config-management orphan report")?;
    writer
        .write(&cfg.reports.monitoring_orphans, &outcome.monitoring_report)
        .context("Failed to write monitoring orphan report")?;
    Ok(())
}

fn log_coverage(cfg: &ReconcilerConfig, outcome: &ReconcileOutcome) {
    for environment in &cfg.config_management.coverage_environments {
        let Some(batch) = outcome.config_batches.iter().find(|b| &b.environment == environment) else {
            warn!("coverage: environment {} was not fetched", environment);
            continue;
        };
        for entry in monitored_nodes(&batch.nodes, &outcome.servers) {
            match entry.server_id {
                Some(id) => info!("coverage {}: {} -> server {}", environment, entry.node_name, id),
                None => info!("coverage {}: {} -> not monitored", environment, entry.node_name),
            }
        }
    }
}

async fn log_alert_policy(monitoring: &HttpMonitoringClient, name: &str) {
    let policy = match monitoring.alert_policy(name).await {
        Ok(Some(policy)) => policy,
        Ok(None) => {
            warn!("alert policy {} not found", name);
            return;
        }
        Err(e) => {
            error!("failed to look up alert policy {}: {}", name, e);
            return;
        }
    };
    info!(
        policy = %policy.name,
        "alert policy {} created {:?} updated {:?}",
        policy.id,
        policy.created(),
        policy.updated()
    );
    match monitoring.conditions_for_policy(policy.id).await {
        Ok(conditions) => {
            for condition in conditions {
                info!(
                    policy = %policy.name,
                    "condition {} ({}) enabled={} entities={:?}",
                    condition.name,
                    condition.condition_type,
                    condition.enabled,
                    condition.entities
                );
            }
        }
        Err(e) => error!("failed to list conditions of policy {}: {}", policy.name, e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = load_config().await.context("Failed to load configuration")?;
    init_logging(&cfg)?;

    let api_key = cfg.resolve_api_key().await.context("Failed to resolve monitoring api key")?;
    let monitoring = Arc::new(HttpMonitoringClient::new(&cfg.monitoring.api_url, &api_key));
    let collaborators = Collaborators {
        cloud: Arc::new(SnapshotCloudClient::new(&cfg.cloud.snapshot_dir)),
        config: Arc::new(SnapshotConfigClient::new(&cfg.config_management.snapshot_file)),
        monitoring: monitoring.clone(),
    };

    let now = OffsetDateTime::now_utc();
    let tracker = RunTracker::start(now);
    info!(run_id = %tracker.run_id(), dry_run = cfg.dry_run, "reconciliation starting");

    let reconciler = Reconciler::new(collaborators, ReconcilerSettings::from_config(&cfg));
    let outcome = match reconciler.run(now).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(run_id = %tracker.run_id(), "reconciliation aborted: {}", e);
            return Err(e).context("Reconciliation aborted");
        }
    };

    write_reports(&cfg, &outcome)?;
    log_coverage(&cfg, &outcome);
    if let Some(name) = &cfg.monitoring.alert_policy {
        log_alert_policy(&monitoring, name).await;
    }

    let summary = tracker.finish(outcome.stats.clone(), cfg.dry_run);
    let json = serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?;
    info!("run summary: {}", json);
    println!("{json}");
    Ok(())
}
