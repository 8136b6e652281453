/**
 * HOST REGISTRY - Registre unifié des hôtes de la flotte
 *
 * RÔLE : Stockage ip -> HostRecord (autoritaire) + index secondaire
 * hostname -> ip, utilisé quand une source n'a pas d'IP (monitoring).
 *
 * INVARIANTS :
 * - au plus un HostRecord par IP
 * - un hostname pointe vers un seul enregistrement ; un second lien vers une
 *   autre IP est un conflit (journalisé, le dernier écrivain gagne)
 */

use crate::error::{ReconcileError, ReconcileResult};
use crate::models::{HostRecord, SourceInfo};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Un hostname déjà lié à une IP a été revendiqué pour une autre IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostnameConflict {
    pub hostname: String,
    pub previous_ip: String,
    pub ip: String,
}

#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: BTreeMap<String, HostRecord>, // ip -> record, ordre stable pour les rapports
    by_hostname: HashMap<String, String>, // hostname -> ip
    conflicts: Vec<HostnameConflict>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renvoie l'enregistrement existant ou crée `{ip}`
    pub fn get_or_create(&mut self, ip: &str) -> ReconcileResult<&mut HostRecord> {
        if ip.trim().is_empty() {
            return Err(ReconcileError::InvalidKey("ip cannot be empty".into()));
        }
        Ok(self.hosts.entry(ip.to_string()).or_insert_with(|| {
            debug!("creating server record for {}", ip);
            HostRecord::new(ip)
        }))
    }

    /// Lie un hostname à l'enregistrement d'une IP (dernier écrivain gagne).
    /// Renvoie le conflit éventuel, déjà journalisé.
    pub fn link_hostname(&mut self, hostname: &str, ip: &str) -> ReconcileResult<Option<HostnameConflict>> {
        if !self.hosts.contains_key(ip) {
            return Err(ReconcileError::InvalidKey(format!(
                "cannot link hostname {hostname} to unknown ip {ip}"
            )));
        }

        let previous = self.by_hostname.insert(hostname.to_string(), ip.to_string());
        match previous {
            Some(previous_ip) if previous_ip != ip => {
                warn!(
                    hostname = %hostname,
                    previous_ip = %previous_ip,
                    ip = %ip,
                    "duplicate hostname - rebinding to newer record"
                );
                let conflict = HostnameConflict {
                    hostname: hostname.to_string(),
                    previous_ip,
                    ip: ip.to_string(),
                };
                self.conflicts.push(conflict.clone());
                Ok(Some(conflict))
            }
            _ => Ok(None),
        }
    }

    /// Affecte le sous-enregistrement d'une source sur l'enregistrement `ip`
    /// (créé si besoin). Renvoie la valeur précédente de la même source.
    pub fn merge_field(&mut self, ip: &str, info: SourceInfo) -> ReconcileResult<Option<SourceInfo>> {
        let source = info.source();
        let record = self.get_or_create(ip)?;
        let previous = record.assign(info);
        if previous.is_some() {
            debug!("{} info replaced on {}", source, ip);
        }
        Ok(previous)
    }

    pub fn get(&self, ip: &str) -> Option<&HostRecord> {
        self.hosts.get(ip)
    }

    pub fn ip_for_hostname(&self, hostname: &str) -> Option<&str> {
        self.by_hostname.get(hostname).map(String::as_str)
    }

    pub fn lookup_hostname(&self, hostname: &str) -> Option<&HostRecord> {
        self.ip_for_hostname(hostname).and_then(|ip| self.hosts.get(ip))
    }

    /// Enregistrements triés par IP
    pub fn iter(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.values()
    }

    pub fn conflicts(&self) -> &[HostnameConflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceIdentity {
    pub account: String,
    pub region: String,
}

/// instance_id -> compte/région, construit pendant l'ingestion cloud
#[derive(Debug, Default)]
pub struct InstanceIdentityIndex {
    instances: HashMap<String, InstanceIdentity>,
}

impl InstanceIdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance_id: &str, account: &str, region: &str) {
        self.instances.insert(
            instance_id.to_string(),
            InstanceIdentity {
                account: account.to_string(),
                region: region.to_string(),
            },
        );
    }

    pub fn get(&self, instance_id: &str) -> Option<&InstanceIdentity> {
        self.instances.get(instance_id)
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.instances.contains_key(instance_id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CloudInfo, ConfigInfo};

    fn cloud(id: &str) -> SourceInfo {
        SourceInfo::Cloud(CloudInfo {
            account: "acme".into(),
            region: "us-west-1".into(),
            instance_id: id.into(),
        })
    }

    #[test]
    fn test_get_or_create_rejects_empty_ip() {
        let mut registry = HostRegistry::new();
        assert!(matches!(registry.get_or_create(""), Err(ReconcileError::InvalidKey(_))));
        assert!(matches!(registry.get_or_create("  "), Err(ReconcileError::InvalidKey(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_or_create_is_unique_per_ip() {
        let mut registry = HostRegistry::new();
        registry.get_or_create("10.0.0.1").unwrap();
        registry.get_or_create("10.0.0.1").unwrap();
        registry.get_or_create("10.0.0.2").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_merge_field_is_idempotent() {
        let mut registry = HostRegistry::new();
        registry.merge_field("10.0.0.1", cloud("i-1")).unwrap();
        let snapshot = registry.get("10.0.0.1").cloned();

        let previous = registry.merge_field("10.0.0.1", cloud("i-1")).unwrap();
        assert_eq!(previous, Some(cloud("i-1")));
        assert_eq!(registry.get("10.0.0.1").cloned(), snapshot);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_merge_field_keeps_other_sources() {
        let mut registry = HostRegistry::new();
        registry.merge_field("10.0.0.1", cloud("i-1")).unwrap();
        let config = ConfigInfo { name: "web1".into(), environment: "prod".into(), run_list: vec!["role[web]".into()] };
        registry.merge_field("10.0.0.1", SourceInfo::Config(config.clone())).unwrap();

        let record = registry.get("10.0.0.1").unwrap();
        assert!(record.cloud.is_some());
        assert_eq!(record.config, Some(config));
    }

    #[test]
    fn test_hostname_conflict_last_writer_wins() {
        let mut registry = HostRegistry::new();
        registry.get_or_create("10.0.0.1").unwrap();
        registry.get_or_create("10.0.0.2").unwrap();

        assert_eq!(registry.link_hostname("h", "10.0.0.1").unwrap(), None);
        // même lien : pas de conflit
        assert_eq!(registry.link_hostname("h", "10.0.0.1").unwrap(), None);

        let conflict = registry.link_hostname("h", "10.0.0.2").unwrap().unwrap();
        assert_eq!(conflict.previous_ip, "10.0.0.1");
        assert_eq!(registry.lookup_hostname("h").unwrap().ip, "10.0.0.2");
        assert_eq!(registry.conflicts().len(), 1);
    }

    #[test]
    fn test_link_hostname_requires_record() {
        let mut registry = HostRegistry::new();
        assert!(registry.link_hostname("h", "10.0.0.1").is_err());
        assert!(registry.lookup_hostname("h").is_none());
    }

    #[test]
    fn test_iter_is_sorted_by_ip() {
        let mut registry = HostRegistry::new();
        for ip in ["10.0.0.3", "10.0.0.1", "10.0.0.2"] {
            registry.get_or_create(ip).unwrap();
        }
        let ips: Vec<_> = registry.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_instance_index() {
        let mut index = InstanceIdentityIndex::new();
        index.insert("i-1", "acme", "us-west-1");
        assert!(index.contains("i-1"));
        assert_eq!(index.get("i-1").unwrap().region, "us-west-1");
        assert!(!index.contains("i-2"));
        assert_eq!(index.len(), 1);
    }
}
