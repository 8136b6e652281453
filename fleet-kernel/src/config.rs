use crate::clients::monitoring::DEFAULT_API_URL;
use crate::error::{ReconcileError, ReconcileResult};
use crate::report::{CONFIG_ORPHANS_REPORT, HOSTS_REPORT, MONITORING_ORPHANS_REPORT};
use crate::staleness::{DEFAULT_STALENESS_DAYS, MAX_STALENESS_DAYS, MIN_STALENESS_DAYS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const CONFIG_PATH_VAR: &str = "FLEET_RECONCILER_CONFIG";
pub const API_KEY_VAR: &str = "MONITORING_API_KEY";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub cloud: CloudConf,
    pub config_management: ConfigManagementConf,
    pub monitoring: MonitoringConf,
    pub staleness_days: Option<i64>,
    pub call_timeout_secs: Option<u64>,
    pub dry_run: bool,
    pub reports: ReportsConf,
    pub log: LogConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CloudAccount {
    pub id: String,
    #[serde(default)]
    pub regions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CloudConf {
    pub accounts: Vec<CloudAccount>,
    pub snapshot_dir: PathBuf,
}

impl Default for CloudConf {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            snapshot_dir: PathBuf::from("./inventory/cloud"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ConfigManagementConf {
    /// Absent = tous les environnements connus
    pub environments: Option<Vec<String>>,
    pub snapshot_file: PathBuf,
    pub delete_orphans: bool,
    pub coverage_environments: Vec<String>,
}

impl Default for ConfigManagementConf {
    fn default() -> Self {
        Self {
            environments: None,
            snapshot_file: PathBuf::from("./inventory/nodes.json"),
            delete_orphans: false,
            coverage_environments: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MonitoringConf {
    pub api_url: String,
    pub api_key: Option<String>,
    pub delete_orphans: bool,
    pub alert_policy: Option<String>,
}

impl Default for MonitoringConf {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            api_key: None,
            delete_orphans: true,
            alert_policy: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ReportsConf {
    pub dir: PathBuf,
    pub hosts: String,
    pub config_orphans: String,
    pub monitoring_orphans: String,
}

impl Default for ReportsConf {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            hosts: HOSTS_REPORT.into(),
            config_orphans: CONFIG_ORPHANS_REPORT.into(),
            monitoring_orphans: MONITORING_ORPHANS_REPORT.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConf {
    /// None = stderr
    pub file: Option<PathBuf>,
    pub level: String,
}

impl Default for LogConf {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("./reconciler.log")),
            level: "warn".into(),
        }
    }
}

impl ReconcilerConfig {
    pub fn staleness_days(&self) -> i64 {
        self.staleness_days.unwrap_or(DEFAULT_STALENESS_DAYS)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.unwrap_or(60))
    }

    /// Rejette les valeurs qui désactiveraient la fenêtre de grâce ou les échéances
    pub fn validate(&self) -> ReconcileResult<()> {
        let days = self.staleness_days();
        if !(MIN_STALENESS_DAYS..=MAX_STALENESS_DAYS).contains(&days) {
            return Err(ReconcileError::Config(format!(
                "staleness_days must be between {MIN_STALENESS_DAYS} and {MAX_STALENESS_DAYS}, got {days}"
            )));
        }
        if self.call_timeout_secs == Some(0) {
            return Err(ReconcileError::Config("call_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Clé API monitoring : config, puis variable d'env, puis ~/.newrelic/api.key
    pub async fn resolve_api_key(&self) -> ReconcileResult<String> {
        if let Some(key) = self.monitoring.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.trim().to_string());
        }
        if let Ok(key) = std::env::var(API_KEY_VAR) {
            if !key.trim().is_empty() {
                return Ok(key.trim().to_string());
            }
        }
        let path = dirs::home_dir()
            .map(|home| home.join(".newrelic").join("api.key"))
            .ok_or_else(|| ReconcileError::Config("no home directory to look up the api key".into()))?;
        read_api_key(&path).await
    }
}

async fn read_api_key(path: &Path) -> ReconcileResult<String> {
    let key = fs::read_to_string(path)
        .await
        .map_err(|e| ReconcileError::Config(format!("monitoring api key unavailable ({}): {e}", path.display())))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ReconcileError::Config(format!("empty monitoring api key in {}", path.display())));
    }
    Ok(key.to_string())
}

pub async fn load_config_from(path: &Path) -> ReconcileResult<ReconcilerConfig> {
    if !path.exists() {
        // logs pas encore installés à ce stade
        eprintln!("[reconciler] pas de {}, usage config par défaut", path.display());
        return Ok(ReconcilerConfig::default());
    }
    let txt = fs::read_to_string(path).await?;
    if txt.trim().is_empty() {
        return Ok(ReconcilerConfig::default());
    }
    let cfg: ReconcilerConfig =
        serde_yaml::from_str(&txt).map_err(|e| ReconcileError::Config(format!("invalid {}: {e}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config() -> ReconcileResult<ReconcilerConfig> {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "reconciler.yaml".into());
    load_config_from(Path::new(&path)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.yaml")).await.unwrap();
        assert_eq!(cfg.staleness_days(), 45);
        assert_eq!(cfg.call_timeout(), Duration::from_secs(60));
        assert!(!cfg.config_management.delete_orphans);
        assert!(cfg.monitoring.delete_orphans);
        assert_eq!(cfg.monitoring.api_url, "https://api.newrelic.com");
        assert_eq!(cfg.reports.hosts, "cloud_assets.csv");
        assert_eq!(cfg.log.level, "warn");
    }

    #[tokio::test]
    async fn test_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciler.yaml");
        std::fs::write(
            &path,
            r#"
cloud:
  accounts:
    - id: acme
      regions: [us-west-1, us-east-1]
config_management:
  environments: [prod]
monitoring:
  api_key: " secret "
staleness_days: 30
dry_run: true
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).await.unwrap();
        assert_eq!(cfg.cloud.accounts[0].regions, ["us-west-1", "us-east-1"]);
        assert_eq!(cfg.cloud.snapshot_dir, PathBuf::from("./inventory/cloud"));
        assert_eq!(cfg.config_management.environments, Some(vec!["prod".to_string()]));
        assert_eq!(cfg.staleness_days(), 30);
        assert!(cfg.dry_run);
        assert_eq!(cfg.resolve_api_key().await.unwrap(), "secret");
    }

    #[tokio::test]
    async fn test_invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciler.yaml");
        std::fs::write(&path, "staleness_days: [not, a, number]\n").unwrap();
        assert!(matches!(load_config_from(&path).await, Err(ReconcileError::Config(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciler.yaml");
        for body in [
            "staleness_days: -1\n",
            "staleness_days: 0\n",
            "staleness_days: 9000000000000000\n",
            "call_timeout_secs: 0\n",
        ] {
            std::fs::write(&path, body).unwrap();
            assert!(
                matches!(load_config_from(&path).await, Err(ReconcileError::Config(_))),
                "accepted {body:?}"
            );
        }

        std::fs::write(&path, "staleness_days: 1\ncall_timeout_secs: 1\n").unwrap();
        assert!(load_config_from(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_api_key_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.key");
        std::fs::write(&path, "abc123\n").unwrap();
        assert_eq!(read_api_key(&path).await.unwrap(), "abc123");

        std::fs::write(&path, "  \n").unwrap();
        assert!(read_api_key(&path).await.is_err());
    }
}
