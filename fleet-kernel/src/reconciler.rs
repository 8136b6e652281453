/**
 * RECONCILER - Pilote d'une passe de réconciliation
 *
 * RÔLE : Récupère les trois inventaires, les fusionne dans un HostRegistry,
 * puis dispose des orphelins (rapport / suppression).
 *
 * FONCTIONNEMENT :
 * - récupération concurrente : les trois sources en parallèle, le cloud en
 *   parallèle par compte/région ; chaque appel a une échéance
 * - fusion séquentielle, un seul propriétaire du registre, dans l'ordre
 *   cloud -> gestion de config -> monitoring (l'index hostname est en
 *   "dernier écrivain gagne", le monitoring doit voir les deux autres)
 * - tout échec ou dépassement d'échéance d'un collaborateur interrompt la passe
 */

use crate::clients::{with_timeout, ClientResult, CloudInventoryClient, ConfigManagementClient, MonitoringClient};
use crate::config::{CloudAccount, ReconcilerConfig};
use crate::error::{ReconcileError, ReconcileResult};
use crate::ingest::{
    CandidateOrphan, CloudBatch, CloudIngestor, ConfigBatch, ConfigIngestor, MergeContext, MonitoringIngestor,
    SourceIngestor,
};
use crate::models::{NodeDescriptor, ServerDescriptor};
use crate::orphans::OrphanReporter;
use crate::registry::{HostRegistry, InstanceIdentityIndex};
use crate::report::{ConfigOrphanRow, MonitoringOrphanRow};
use crate::staleness::StalenessPolicy;
use crate::stats::RunStats;
use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info};

/// Collaborateurs injectés par le binaire (ou les stubs du devkit)
#[derive(Clone)]
pub struct Collaborators {
    pub cloud: Arc<dyn CloudInventoryClient>,
    pub config: Arc<dyn ConfigManagementClient>,
    pub monitoring: Arc<dyn MonitoringClient>,
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub accounts: Vec<CloudAccount>,
    /// None = tous les environnements connus
    pub environments: Option<Vec<String>>,
    pub policy: StalenessPolicy,
    pub call_timeout: Duration,
    pub dry_run: bool,
    pub delete_config_orphans: bool,
    pub delete_monitoring_orphans: bool,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self::from_config(&ReconcilerConfig::default())
    }
}

impl ReconcilerSettings {
    pub fn from_config(cfg: &ReconcilerConfig) -> Self {
        Self {
            accounts: cfg.cloud.accounts.clone(),
            environments: cfg.config_management.environments.clone(),
            policy: StalenessPolicy::from_days(cfg.staleness_days()),
            call_timeout: cfg.call_timeout(),
            dry_run: cfg.dry_run,
            delete_config_orphans: cfg.config_management.delete_orphans,
            delete_monitoring_orphans: cfg.monitoring.delete_orphans,
        }
    }
}

/// Résultat d'une passe, rendu au binaire
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub registry: HostRegistry,
    pub instances: InstanceIdentityIndex,
    pub config_batches: Vec<ConfigBatch>,
    pub servers: Vec<ServerDescriptor>,
    pub config_orphans: Vec<CandidateOrphan<NodeDescriptor>>,
    pub monitoring_orphans: Vec<CandidateOrphan<ServerDescriptor>>,
    pub config_report: Vec<ConfigOrphanRow>,
    pub monitoring_report: Vec<MonitoringOrphanRow>,
    pub stats: RunStats,
}

/// Applique l'échéance à un appel et nomme le collaborateur et la phase en cas d'échec
pub async fn with_deadline<T, F>(
    timeout: Duration,
    collaborator: &'static str,
    phase: &'static str,
    call: F,
) -> ReconcileResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    with_timeout(timeout, call)
        .await
        .map_err(|source| ReconcileError::UpstreamUnavailable {
            collaborator,
            phase,
            source,
        })
}

pub struct Reconciler {
    collaborators: Collaborators,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(collaborators: Collaborators, settings: ReconcilerSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    async fn fetch_cloud(&self) -> ReconcileResult<Vec<CloudBatch>> {
        let cloud = self.collaborators.cloud.as_ref();
        let timeout = self.settings.call_timeout;

        let calls = self
            .settings
            .accounts
            .iter()
            .flat_map(|account| account.regions.iter().map(move |region| (account.id.as_str(), region.as_str())))
            .map(|(account, region)| async move {
                debug!("querying instances in {} in {}", account, region);
                let instances =
                    with_deadline(timeout, "cloud", "list_instances", cloud.list_instances(account, region)).await?;
                Ok::<_, ReconcileError>(CloudBatch {
                    account: account.to_string(),
                    region: region.to_string(),
                    instances,
                })
            });
        // try_join_all conserve l'ordre de configuration
        try_join_all(calls).await
    }

    async fn fetch_config(&self) -> ReconcileResult<Vec<ConfigBatch>> {
        let config = self.collaborators.config.as_ref();
        let timeout = self.settings.call_timeout;

        let environments = match &self.settings.environments {
            Some(environments) => environments.clone(),
            None => with_deadline(timeout, "config-management", "list_environments", config.list_environments()).await?,
        };

        let calls = environments.into_iter().map(|environment| async move {
            let nodes = with_deadline(timeout, "config-management", "list_nodes", config.list_nodes(&environment)).await?;
            Ok::<_, ReconcileError>(ConfigBatch { environment, nodes })
        });
        try_join_all(calls).await
    }

    async fn fetch_monitoring(&self) -> ReconcileResult<Vec<ServerDescriptor>> {
        let monitoring = self.collaborators.monitoring.as_ref();
        with_deadline(self.settings.call_timeout, "monitoring", "list_servers", monitoring.list_servers()).await
    }

    pub async fn run(&self, now: OffsetDateTime) -> ReconcileResult<ReconcileOutcome> {
        let (cloud_batches, config_batches, servers) =
            tokio::try_join!(self.fetch_cloud(), self.fetch_config(), self.fetch_monitoring())?;
        info!(
            "fetched {} cloud batches, {} environments, {} monitoring servers",
            cloud_batches.len(),
            config_batches.len(),
            servers.len()
        );

        let mut registry = HostRegistry::new();
        let mut instances = InstanceIdentityIndex::new();
        let mut stats = RunStats::default();

        let (config_orphans, monitoring_orphans) = {
            let mut ctx = MergeContext {
                registry: &mut registry,
                instances: &mut instances,
                stats: &mut stats,
            };
            CloudIngestor.ingest(&mut ctx, &cloud_batches)?;
            let config_orphans = ConfigIngestor {
                policy: self.settings.policy,
                now,
            }
            .ingest(&mut ctx, &config_batches)?;
            let monitoring_orphans = MonitoringIngestor.ingest(&mut ctx, &servers)?;
            (config_orphans, monitoring_orphans)
        };
        stats.hosts = u32::try_from(registry.len()).unwrap_or(u32::MAX);
        info!("merged {} hosts ({} hostname conflicts)", registry.len(), stats.hostname_conflicts);

        let reporter = OrphanReporter {
            policy: self.settings.policy,
            call_timeout: self.settings.call_timeout,
            dry_run: self.settings.dry_run,
            delete_config_orphans: self.settings.delete_config_orphans,
            delete_monitoring_orphans: self.settings.delete_monitoring_orphans,
        };
        let config_report = reporter
            .dispose_config(&config_orphans, &instances, self.collaborators.config.as_ref(), &mut stats)
            .await;
        let monitoring_report = reporter
            .dispose_monitoring(&monitoring_orphans, self.collaborators.monitoring.as_ref(), now, &mut stats)
            .await;

        Ok(ReconcileOutcome {
            registry,
            instances,
            config_batches,
            servers,
            config_orphans,
            monitoring_orphans,
            config_report,
            monitoring_report,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientError;

    #[tokio::test]
    async fn test_with_deadline_passes_value_through() {
        let value = with_deadline(Duration::from_secs(1), "cloud", "list_instances", async { Ok(3) })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_with_deadline_names_collaborator_on_error() {
        let err = with_deadline::<(), _>(Duration::from_secs(1), "monitoring", "list_servers", async {
            Err(ClientError::Other("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "monitoring unavailable during list_servers: boom");
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let err = with_deadline::<(), _>(Duration::from_millis(20), "config-management", "list_nodes", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::UpstreamUnavailable { collaborator: "config-management", source: ClientError::Timeout(_), .. }
        ));
    }

    #[test]
    fn test_settings_follow_config_defaults() {
        let settings = ReconcilerSettings::default();
        assert_eq!(settings.policy, StalenessPolicy::default());
        assert_eq!(settings.call_timeout, Duration::from_secs(60));
        assert!(!settings.delete_config_orphans);
        assert!(settings.delete_monitoring_orphans);
        assert!(!settings.dry_run);
    }
}
