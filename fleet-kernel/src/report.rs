//! CSV reports: unified host inventory, config-management orphans and
//! monitoring orphans. Quoted header row, one quoted row per record.

use crate::error::ReconcileResult;
use crate::models::HostRecord;
use crate::registry::HostRegistry;
use csv::{QuoteStyle, WriterBuilder};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info};

pub const HOSTS_REPORT: &str = "cloud_assets.csv";
pub const CONFIG_ORPHANS_REPORT: &str = "config_orphans.csv";
pub const MONITORING_ORPHANS_REPORT: &str = "monitoring_orphans.csv";

/// A record with a fixed column layout
pub trait ReportRow {
    const HEADER: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

fn format_time(ts: Option<OffsetDateTime>) -> String {
    ts.and_then(|t| t.format(&Rfc3339).ok()).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRow {
    pub ip: String,
    pub config_name: String,
    pub config_run_list: String,
    pub cloud_account: String,
    pub cloud_instance_id: String,
    pub monitoring_server_id: String,
}

impl From<&HostRecord> for HostRow {
    fn from(record: &HostRecord) -> Self {
        Self {
            ip: record.ip.clone(),
            config_name: record.config.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
            config_run_list: record.config.as_ref().map(|c| c.run_list.join(",")).unwrap_or_default(),
            cloud_account: record.cloud.as_ref().map(|c| c.account.clone()).unwrap_or_default(),
            cloud_instance_id: record.cloud.as_ref().map(|c| c.instance_id.clone()).unwrap_or_default(),
            monitoring_server_id: record.monitoring.as_ref().map(|m| m.id.to_string()).unwrap_or_default(),
        }
    }
}

impl ReportRow for HostRow {
    const HEADER: &'static [&'static str] = &[
        "ip",
        "config name",
        "config run_list",
        "cloud account",
        "cloud instance",
        "monitoring server id",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.ip.clone(),
            self.config_name.clone(),
            self.config_run_list.clone(),
            self.cloud_account.clone(),
            self.cloud_instance_id.clone(),
            self.monitoring_server_id.clone(),
        ]
    }
}

/// Lignes du rapport d'inventaire, une par IP ; chaque source manquante est journalisée
pub fn host_rows(registry: &HostRegistry) -> Vec<HostRow> {
    registry
        .iter()
        .map(|record| {
            if record.config.is_none() {
                error!("{} has no config-management info", record.ip);
            }
            if record.cloud.is_none() {
                error!("{} has no cloud info", record.ip);
            }
            if record.monitoring.is_none() {
                error!("{} has no monitoring info", record.ip);
            }
            HostRow::from(record)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOrphanRow {
    pub name: String,
    pub host: String,
    pub instance_id: String,
    pub environment: String,
    pub run_list: String,
    pub checkin: Option<OffsetDateTime>,
}

impl ReportRow for ConfigOrphanRow {
    const HEADER: &'static [&'static str] = &["name", "host", "instance_id", "environment", "run_list", "checkin"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.host.clone(),
            self.instance_id.clone(),
            self.environment.clone(),
            self.run_list.clone(),
            format_time(self.checkin),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringOrphanRow {
    pub id: u64,
    pub host: String,
    pub reporting: bool,
    pub last_reported_at: Option<OffsetDateTime>,
}

impl ReportRow for MonitoringOrphanRow {
    const HEADER: &'static [&'static str] = &["id", "host", "reporting", "last report"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.host.clone(),
            self.reporting.to_string(),
            format_time(self.last_reported_at),
        ]
    }
}

/// Écrit l'en-tête puis les lignes, tous les champs entre quotes simples
pub fn write_rows<W: Write, R: ReportRow>(writer: W, rows: &[R]) -> ReconcileResult<()> {
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .quote(b'\'')
        .from_writer(writer);
    wtr.write_record(R::HEADER)?;
    for row in rows {
        wtr.write_record(row.fields())?;
    }
    wtr.flush()?;
    Ok(())
}

/// Écrit les rapports dans un répertoire
pub struct CsvReportWriter {
    dir: PathBuf,
}

impl CsvReportWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn write<R: ReportRow>(&self, file_name: &str, rows: &[R]) -> ReconcileResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        let file = std::fs::File::create(&path)?;
        write_rows(file, rows)?;
        info!("wrote {} rows to {}", rows.len(), path.display());
        Ok(path)
    }
}
