/**
 * MODELS - Enregistrements d'hôtes unifiés et descripteurs des trois sources
 *
 * RÔLE : Un HostRecord par IP, avec un sous-enregistrement optionnel par source
 * (cloud, gestion de configuration, monitoring). Les descripteurs sont la forme
 * brute renvoyée par chaque collaborateur.
 */

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use time::{Duration, OffsetDateTime};

/// Source d'inventaire, dans l'ordre d'ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cloud,
    ConfigManagement,
    Monitoring,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Cloud => "cloud",
            Source::ConfigManagement => "config-management",
            Source::Monitoring => "monitoring",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudInfo {
    pub account: String,
    pub region: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    pub name: String,
    pub environment: String,
    pub run_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringInfo {
    pub id: u64,
    pub account_id: u64,
    pub name: String,
    pub host: String,
    pub reporting: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_reported_at: Option<OffsetDateTime>,
}

/// Sous-enregistrement propre à une source, affecté tel quel sur le HostRecord
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInfo {
    Cloud(CloudInfo),
    Config(ConfigInfo),
    Monitoring(MonitoringInfo),
}

impl SourceInfo {
    pub fn source(&self) -> Source {
        match self {
            SourceInfo::Cloud(_) => Source::Cloud,
            SourceInfo::Config(_) => Source::ConfigManagement,
            SourceInfo::Monitoring(_) => Source::Monitoring,
        }
    }
}

/// Enregistrement unifié d'un hôte, clé primaire = IP privée
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRecord {
    pub ip: String,
    pub cloud: Option<CloudInfo>,
    pub config: Option<ConfigInfo>,
    pub monitoring: Option<MonitoringInfo>,
}

impl HostRecord {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            cloud: None,
            config: None,
            monitoring: None,
        }
    }

    /// Affecte le sous-enregistrement de la source et renvoie l'ancienne valeur.
    /// Affectation, jamais accumulation.
    pub fn assign(&mut self, info: SourceInfo) -> Option<SourceInfo> {
        match info {
            SourceInfo::Cloud(c) => self.cloud.replace(c).map(SourceInfo::Cloud),
            SourceInfo::Config(c) => self.config.replace(c).map(SourceInfo::Config),
            SourceInfo::Monitoring(m) => self.monitoring.replace(m).map(SourceInfo::Monitoring),
        }
    }
}

// --- Descripteurs bruts des collaborateurs ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub id: String,
    pub state: String,
    pub private_ip: Option<String>,
    pub private_dns_name: Option<String>,
}

impl InstanceDescriptor {
    pub fn is_terminated(&self) -> bool {
        self.state.eq_ignore_ascii_case("terminated")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ec2Attributes {
    pub instance_id: Option<String>,
}

/// Attributs découverts par l'agent de gestion de configuration (ohai)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomaticAttributes {
    pub ipaddress: Option<String>,
    pub hostname: Option<String>,
    /// Dernier passage de l'agent, secondes epoch (fractionnaires)
    pub ohai_time: Option<f64>,
    pub ec2: Option<Ec2Attributes>,
}

impl AutomaticAttributes {
    pub fn is_empty(&self) -> bool {
        self.ipaddress.is_none()
            && self.hostname.is_none()
            && self.ohai_time.is_none()
            && self.ec2.is_none()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.ec2
            .as_ref()
            .and_then(|ec2| ec2.instance_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn last_check_in(&self) -> Option<OffsetDateTime> {
        let secs = self.ohai_time?;
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.trunc();
        let nanos = ((secs - whole) * 1e9).round() as i64;
        OffsetDateTime::from_unix_timestamp(whole as i64)
            .ok()
            .map(|t| t + Duration::nanoseconds(nanos))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    #[serde(alias = "chef_environment")]
    pub environment: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub run_list: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub automatic: AutomaticAttributes,
}

/// `null` explicite traité comme une clé absente
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub host: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reporting: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_reported_at: Option<OffsetDateTime>,
}

impl ServerDescriptor {
    pub fn to_info(&self) -> MonitoringInfo {
        MonitoringInfo {
            id: self.id,
            account_id: self.account_id,
            name: self.name.clone(),
            host: self.host.clone().unwrap_or_default(),
            reporting: self.reporting,
            last_reported_at: self.last_reported_at,
        }
    }
}
