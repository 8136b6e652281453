/**
 * SOURCE INGESTORS - Fusion des flux de chaque source dans le registre
 *
 * RÔLE : Un ingesteur par source (cloud, gestion de config, monitoring).
 * Chacun normalise ses entités, les fusionne dans le HostRegistry et
 * collecte les orphelins candidats.
 *
 * ORDRE : cloud -> gestion de config -> monitoring. Le "dernier écrivain gagne"
 * de l'index hostname dépend de cet ordre ; c'est le Reconciler qui le garantit.
 */

use crate::error::{ReconcileError, ReconcileResult};
use crate::models::{CloudInfo, ConfigInfo, InstanceDescriptor, NodeDescriptor, ServerDescriptor, Source, SourceInfo};
use crate::normalize::Normalize;
use crate::registry::{HostRegistry, InstanceIdentityIndex};
use crate::staleness::{NodeValidity, OrphanReason, StalenessPolicy};
use crate::stats::RunStats;
use serde::Serialize;
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

/// Entité d'une source restée sans correspondance dans les autres
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateOrphan<T> {
    pub source: Source,
    pub entity: T,
    pub reason: OrphanReason,
}

/// Instances d'un couple compte/région
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudBatch {
    pub account: String,
    pub region: String,
    pub instances: Vec<InstanceDescriptor>,
}

/// Noeuds d'un environnement de gestion de configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBatch {
    pub environment: String,
    pub nodes: Vec<NodeDescriptor>,
}

/// État partagé, possédé par un seul écrivain pendant la phase de fusion
pub struct MergeContext<'a> {
    pub registry: &'a mut HostRegistry,
    pub instances: &'a mut InstanceIdentityIndex,
    pub stats: &'a mut RunStats,
}

impl MergeContext<'_> {
    fn link(&mut self, hostname: &str, ip: &str) -> ReconcileResult<()> {
        if self.registry.link_hostname(hostname, ip)?.is_some() {
            self.stats.hostname_conflicts += 1;
        }
        Ok(())
    }

    fn missing_key(&mut self, origin: Source, entity: &str, field: &'static str) {
        self.stats.ingestion_errors += 1;
        let err = ReconcileError::MissingKey {
            origin,
            entity: entity.to_string(),
            field,
        };
        error!("{err} - skipping");
    }
}

pub trait SourceIngestor {
    type Batch: ?Sized;
    type Entity;

    const SOURCE: Source;

    fn ingest(
        &self,
        ctx: &mut MergeContext<'_>,
        batch: &Self::Batch,
    ) -> ReconcileResult<Vec<CandidateOrphan<Self::Entity>>>;
}

/// Le cloud fait foi : aucun orphelin n'est classé de ce côté
pub struct CloudIngestor;

impl SourceIngestor for CloudIngestor {
    type Batch = [CloudBatch];
    type Entity = InstanceDescriptor;

    const SOURCE: Source = Source::Cloud;

    fn ingest(
        &self,
        ctx: &mut MergeContext<'_>,
        batches: &[CloudBatch],
    ) -> ReconcileResult<Vec<CandidateOrphan<InstanceDescriptor>>> {
        for batch in batches {
            debug!("ingesting {} instances in {} / {}", batch.instances.len(), batch.account, batch.region);
            for instance in &batch.instances {
                let Some(keys) = instance.normalize() else {
                    ctx.stats.cloud_skipped_terminated += 1;
                    continue;
                };
                ctx.stats.cloud_instances += 1;
                ctx.instances.insert(&instance.id, &batch.account, &batch.region);

                let Some(ip) = keys.ip else {
                    ctx.missing_key(Self::SOURCE, &instance.id, "private ip address");
                    continue;
                };
                debug!("processing cloud instance {} with IP: {}", instance.id, ip);

                let info = CloudInfo {
                    account: batch.account.clone(),
                    region: batch.region.clone(),
                    instance_id: instance.id.clone(),
                };
                ctx.registry.merge_field(&ip, SourceInfo::Cloud(info))?;
                if let Some(hostname) = keys.hostname {
                    ctx.link(&hostname, &ip)?;
                }
            }
        }
        Ok(Vec::new())
    }
}

pub struct ConfigIngestor {
    pub policy: StalenessPolicy,
    pub now: OffsetDateTime,
}

impl SourceIngestor for ConfigIngestor {
    type Batch = [ConfigBatch];
    type Entity = NodeDescriptor;

    const SOURCE: Source = Source::ConfigManagement;

    fn ingest(
        &self,
        ctx: &mut MergeContext<'_>,
        batches: &[ConfigBatch],
    ) -> ReconcileResult<Vec<CandidateOrphan<NodeDescriptor>>> {
        let mut orphans = Vec::new();
        let mut assigned: HashSet<String> = HashSet::new();

        for batch in batches {
            debug!("querying nodes in environment {}", batch.environment);
            for node in &batch.nodes {
                ctx.stats.config_nodes += 1;

                let validity = self.policy.validate(node, ctx.instances, self.now);
                let reason = match validity {
                    NodeValidity::StaleOrphan(reason) => Some(reason),
                    NodeValidity::StaleCloudBacked => {
                        ctx.stats.stale_cloud_backed += 1;
                        None
                    }
                    NodeValidity::Fresh => None,
                };
                if let Some(reason) = reason {
                    warn!(node = %node.name, ?reason, "invalid node is an orphan candidate");
                    ctx.stats.config_orphans += 1;
                    orphans.push(CandidateOrphan {
                        source: Self::SOURCE,
                        entity: node.clone(),
                        reason,
                    });
                    continue;
                }

                // un noeud valide a toujours une IP (cf. StalenessPolicy::validate)
                let keys = node.normalize().unwrap_or_default();
                let Some(ip) = keys.ip else {
                    return Err(ReconcileError::InternalInvariant(format!(
                        "valid node {} has no ip",
                        node.name
                    )));
                };
                debug!("processing config node {} with IP: {}", node.name, ip);

                let info = ConfigInfo {
                    name: node.name.clone(),
                    environment: batch.environment.clone(),
                    run_list: node.run_list.clone(),
                };
                let previous = ctx.registry.merge_field(&ip, SourceInfo::Config(info.clone()))?;
                if let Some(SourceInfo::Config(previous)) = previous {
                    if assigned.contains(&ip) && previous != info {
                        return Err(ReconcileError::InternalInvariant(format!(
                            "assignment issue: {} already holds config node {} (now {})",
                            ip, previous.name, info.name
                        )));
                    }
                }
                assigned.insert(ip.clone());

                if let Some(hostname) = keys.hostname {
                    ctx.link(&hostname, &ip)?;
                }
            }
        }
        Ok(orphans)
    }
}

pub struct MonitoringIngestor;

impl SourceIngestor for MonitoringIngestor {
    type Batch = [ServerDescriptor];
    type Entity = ServerDescriptor;

    const SOURCE: Source = Source::Monitoring;

    fn ingest(
        &self,
        ctx: &mut MergeContext<'_>,
        servers: &[ServerDescriptor],
    ) -> ReconcileResult<Vec<CandidateOrphan<ServerDescriptor>>> {
        let mut orphans = Vec::new();

        for server in servers {
            ctx.stats.monitoring_servers += 1;
            let Some(hostname) = server.normalize().and_then(|k| k.hostname) else {
                ctx.missing_key(Self::SOURCE, &server.id.to_string(), "host name");
                continue;
            };

            let Some(ip) = ctx.registry.ip_for_hostname(&hostname).map(str::to_string) else {
                error!(server_id = server.id, "no server record matches monitoring server {}", hostname);
                ctx.stats.monitoring_orphans += 1;
                orphans.push(CandidateOrphan {
                    source: Self::SOURCE,
                    entity: server.clone(),
                    reason: OrphanReason::NoHostnameMatch,
                });
                continue;
            };

            debug!("{} is {}", server.host.as_deref().unwrap_or_default(), ip);
            ctx.registry.merge_field(&ip, SourceInfo::Monitoring(server.to_info()))?;
        }
        Ok(orphans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AutomaticAttributes, Ec2Attributes};
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2026-10-17 12:00 UTC);

    struct Fixture {
        registry: HostRegistry,
        instances: InstanceIdentityIndex,
        stats: RunStats,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: HostRegistry::new(),
                instances: InstanceIdentityIndex::new(),
                stats: RunStats::default(),
            }
        }

        fn ctx(&mut self) -> MergeContext<'_> {
            MergeContext {
                registry: &mut self.registry,
                instances: &mut self.instances,
                stats: &mut self.stats,
            }
        }
    }

    fn instance(id: &str, state: &str, ip: Option<&str>, dns: &str) -> InstanceDescriptor {
        InstanceDescriptor {
            id: id.into(),
            state: state.into(),
            private_ip: ip.map(Into::into),
            private_dns_name: Some(dns.into()),
        }
    }

    fn cloud_batch(instances: Vec<InstanceDescriptor>) -> Vec<CloudBatch> {
        vec![CloudBatch { account: "acme".into(), region: "us-west-1".into(), instances }]
    }

    fn node(name: &str, ip: &str, age: Duration, instance_id: Option<&str>) -> NodeDescriptor {
        NodeDescriptor {
            name: name.into(),
            environment: "prod".into(),
            run_list: vec!["role[base]".into()],
            automatic: AutomaticAttributes {
                ipaddress: Some(ip.into()),
                hostname: name.split('.').next().map(Into::into),
                ohai_time: Some((NOW - age).unix_timestamp() as f64),
                ec2: instance_id.map(|id| Ec2Attributes { instance_id: Some(id.into()) }),
            },
        }
    }

    fn config_batch(nodes: Vec<NodeDescriptor>) -> Vec<ConfigBatch> {
        vec![ConfigBatch { environment: "prod".into(), nodes }]
    }

    fn config_ingestor() -> ConfigIngestor {
        ConfigIngestor { policy: StalenessPolicy::default(), now: NOW }
    }

    fn server(id: u64, host: Option<&str>) -> ServerDescriptor {
        ServerDescriptor {
            id,
            account_id: 1,
            name: host.unwrap_or_default().into(),
            host: host.map(Into::into),
            reporting: true,
            last_reported_at: Some(NOW),
        }
    }

    #[test]
    fn test_cloud_skips_terminated_and_missing_ip() {
        let mut fx = Fixture::new();
        let batches = cloud_batch(vec![
            instance("i-1", "running", Some("10.0.0.1"), "web1.internal"),
            instance("i-2", "terminated", Some("10.0.0.2"), "web2.internal"),
            instance("i-3", "pending", None, ""),
        ]);
        let orphans = CloudIngestor.ingest(&mut fx.ctx(), &batches).unwrap();

        assert!(orphans.is_empty());
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.stats.ingestion_errors, 1);
        assert_eq!(fx.stats.cloud_skipped_terminated, 1);
        assert!(fx.instances.contains("i-1"));
        assert!(fx.instances.contains("i-3"));
        assert!(!fx.instances.contains("i-2"));
        assert_eq!(fx.registry.lookup_hostname("web1").unwrap().ip, "10.0.0.1");
    }

    #[test]
    fn test_cloud_ingest_twice_is_idempotent() {
        let mut fx = Fixture::new();
        let batches = cloud_batch(vec![instance("i-1", "running", Some("10.0.0.1"), "web1.internal")]);
        CloudIngestor.ingest(&mut fx.ctx(), &batches).unwrap();
        let once = fx.registry.get("10.0.0.1").cloned();

        CloudIngestor.ingest(&mut fx.ctx(), &batches).unwrap();
        assert_eq!(fx.registry.get("10.0.0.1").cloned(), once);
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.stats.hostname_conflicts, 0);
    }

    #[test]
    fn test_config_hostname_conflict_rebinds() {
        let mut fx = Fixture::new();
        CloudIngestor
            .ingest(&mut fx.ctx(), &cloud_batch(vec![instance("i-1", "running", Some("10.0.0.1"), "h.internal")]))
            .unwrap();
        config_ingestor()
            .ingest(&mut fx.ctx(), &config_batch(vec![node("h.corp", "10.0.0.2", Duration::hours(1), None)]))
            .unwrap();

        assert_eq!(fx.registry.lookup_hostname("h").unwrap().ip, "10.0.0.2");
        assert_eq!(fx.stats.hostname_conflicts, 1);
        assert_eq!(fx.registry.len(), 2);
    }

    #[test]
    fn test_config_stale_orphan_is_not_merged() {
        let mut fx = Fixture::new();
        let orphans = config_ingestor()
            .ingest(&mut fx.ctx(), &config_batch(vec![node("db2", "10.0.0.9", Duration::days(60), None)]))
            .unwrap();

        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].reason, OrphanReason::StaleCheckIn);
        assert_eq!(orphans[0].source, Source::ConfigManagement);
        assert!(fx.registry.is_empty());
        assert!(fx.registry.lookup_hostname("db2").is_none());
    }

    #[test]
    fn test_config_stale_cloud_backed_is_merged() {
        let mut fx = Fixture::new();
        fx.instances.insert("i-7", "acme", "us-west-1");
        let orphans = config_ingestor()
            .ingest(&mut fx.ctx(), &config_batch(vec![node("app7", "10.0.0.7", Duration::days(60), Some("i-7"))]))
            .unwrap();

        assert!(orphans.is_empty());
        assert_eq!(fx.stats.stale_cloud_backed, 1);
        let record = fx.registry.get("10.0.0.7").unwrap();
        assert_eq!(record.config.as_ref().unwrap().name, "app7");
    }

    #[test]
    fn test_config_same_node_twice_is_accepted() {
        let mut fx = Fixture::new();
        let web = node("web1", "10.0.0.1", Duration::hours(2), None);
        config_ingestor()
            .ingest(&mut fx.ctx(), &config_batch(vec![web.clone(), web]))
            .unwrap();
        assert_eq!(fx.registry.len(), 1);
    }

    #[test]
    fn test_config_conflicting_nodes_on_one_ip_abort() {
        let mut fx = Fixture::new();
        let err = config_ingestor()
            .ingest(
                &mut fx.ctx(),
                &config_batch(vec![
                    node("web1", "10.0.0.1", Duration::hours(2), None),
                    node("web1-old", "10.0.0.1", Duration::hours(3), None),
                ]),
            )
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InternalInvariant(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_monitoring_match_and_orphans() {
        let mut fx = Fixture::new();
        CloudIngestor
            .ingest(&mut fx.ctx(), &cloud_batch(vec![instance("i-1", "running", Some("10.0.0.1"), "web1.internal")]))
            .unwrap();

        let orphans = MonitoringIngestor
            .ingest(&mut fx.ctx(), &[server(1, Some("WEB1.internal")), server(2, Some("ghost")), server(3, None)])
            .unwrap();

        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].entity.id, 2);
        assert_eq!(orphans[0].reason, OrphanReason::NoHostnameMatch);
        assert_eq!(fx.stats.ingestion_errors, 1);
        assert_eq!(fx.registry.get("10.0.0.1").unwrap().monitoring.as_ref().unwrap().id, 1);
    }
}
