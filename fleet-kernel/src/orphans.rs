/**
 * ORPHAN REPORTER - Disposition des orphelins candidats
 *
 * RÔLE : Décide pour chaque orphelin : journaliser seulement, écrire dans le
 * rapport, ou supprimer côté source puis écrire dans le rapport.
 *
 * RÈGLES :
 * - monitoring : un serveur qui reporte, ou qui a reporté dans la fenêtre,
 *   n'est jamais supprimé ; sinon suppression, et la ligne de rapport n'est
 *   écrite qu'après une suppression réussie
 * - gestion de config : ligne de rapport pour chaque orphelin non adossé au
 *   cloud ; suppression seulement si activée
 * - un échec de suppression est journalisé et compté, jamais fatal
 * - suppression monitoring désactivée : journalisé seulement, aucune ligne
 */

use crate::clients::{with_timeout, ConfigManagementClient, MonitoringClient};
use crate::ingest::CandidateOrphan;
use crate::models::{NodeDescriptor, ServerDescriptor};
use crate::registry::InstanceIdentityIndex;
use crate::report::{ConfigOrphanRow, MonitoringOrphanRow};
use crate::staleness::StalenessPolicy;
use crate::stats::RunStats;
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetainReason {
    /// Serveur vivant mais sans correspondance
    Reporting,
    /// A reporté dans la fenêtre de grâce
    RecentlyActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "disposition", content = "reason")]
pub enum Disposition {
    RetainLogOnly(RetainReason),
    Delete,
}

#[derive(Debug, Clone, Copy)]
pub struct OrphanReporter {
    pub policy: StalenessPolicy,
    pub call_timeout: Duration,
    pub dry_run: bool,
    pub delete_config_orphans: bool,
    pub delete_monitoring_orphans: bool,
}

impl OrphanReporter {
    pub fn monitoring_disposition(&self, server: &ServerDescriptor, now: OffsetDateTime) -> Disposition {
        if server.reporting {
            return Disposition::RetainLogOnly(RetainReason::Reporting);
        }
        match server.last_reported_at {
            Some(last) if self.policy.is_fresh(last, now) => Disposition::RetainLogOnly(RetainReason::RecentlyActive),
            // jamais reporté : traité comme périmé
            _ => Disposition::Delete,
        }
    }

    pub async fn dispose_monitoring(
        &self,
        orphans: &[CandidateOrphan<ServerDescriptor>],
        client: &dyn MonitoringClient,
        now: OffsetDateTime,
        stats: &mut RunStats,
    ) -> Vec<MonitoringOrphanRow> {
        let mut rows = Vec::new();

        for orphan in orphans {
            let server = &orphan.entity;
            let host = server.host.clone().unwrap_or_default();

            match self.monitoring_disposition(server, now) {
                Disposition::RetainLogOnly(RetainReason::Reporting) => {
                    warn!(server_id = server.id, "{}({}) is running but failed to match cloud servers", server.id, host);
                    stats.monitoring_retained += 1;
                    continue;
                }
                Disposition::RetainLogOnly(RetainReason::RecentlyActive) => {
                    warn!(server_id = server.id, "{} has reported within {} days", host, self.policy.window().whole_days());
                    stats.monitoring_retained += 1;
                    continue;
                }
                Disposition::Delete => {}
            }

            if !self.delete_monitoring_orphans {
                // suppression désactivée : pas de ligne, le rapport ne liste que les suppressions
                info!(server_id = server.id, "would remove monitoring server {} ({})", server.id, host);
                continue;
            }
            if self.dry_run {
                info!(server_id = server.id, "dry run: would remove monitoring server {} ({})", server.id, host);
            } else {
                debug!("removing server {}", server.id);
                if let Err(e) = with_timeout(self.call_timeout, client.delete_server(server.id)).await {
                    error!(server_id = server.id, "failed to delete monitoring server {} ({}): {}", server.id, host, e);
                    stats.deletes_failed += 1;
                    continue;
                }
                stats.deletes_performed += 1;
            }

            rows.push(MonitoringOrphanRow {
                id: server.id,
                host,
                reporting: server.reporting,
                last_reported_at: server.last_reported_at,
            });
        }
        rows
    }

    /// Ligne de rapport avec les champs connus ; `None` si l'instance du noeud
    /// est vivante côté cloud (déjà réconcilié par ce biais)
    pub fn config_row(node: &NodeDescriptor, instances: &InstanceIdentityIndex) -> Option<ConfigOrphanRow> {
        let mut row = ConfigOrphanRow {
            name: node.name.clone(),
            host: String::new(),
            instance_id: String::new(),
            environment: String::new(),
            run_list: String::new(),
            checkin: None,
        };
        let attrs = &node.automatic;
        if attrs.is_empty() {
            return Some(row);
        }

        row.host = attrs.hostname.clone().unwrap_or_default();
        if let Some(instance_id) = attrs.instance_id() {
            if instances.contains(instance_id) {
                error!(
                    node = %node.name,
                    "failed to match config node with existing instance: {} - skipping orphaned node",
                    instance_id
                );
                return None;
            }
            row.instance_id = instance_id.to_string();
        }
        row.environment = node.environment.clone();
        row.run_list = node.run_list.join(",");
        row.checkin = attrs.last_check_in();
        Some(row)
    }

    pub async fn dispose_config(
        &self,
        orphans: &[CandidateOrphan<NodeDescriptor>],
        instances: &InstanceIdentityIndex,
        client: &dyn ConfigManagementClient,
        stats: &mut RunStats,
    ) -> Vec<ConfigOrphanRow> {
        let mut rows = Vec::new();

        for orphan in orphans {
            let Some(row) = Self::config_row(&orphan.entity, instances) else {
                stats.config_orphans_suppressed += 1;
                continue;
            };

            if self.delete_config_orphans && !self.dry_run {
                if let Err(e) = with_timeout(self.call_timeout, client.delete_node(&row.name)).await {
                    error!(node = %row.name, "failed to delete config node: {}", e);
                    stats.deletes_failed += 1;
                    continue;
                }
                stats.deletes_performed += 1;
            }
            rows.push(row);
        }
        rows
    }
}
