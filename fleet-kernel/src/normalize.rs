//! Clés canoniques par source : IP (clé primaire) et hostname court en
//! minuscules (clé secondaire).

use crate::models::{InstanceDescriptor, NodeDescriptor, ServerDescriptor};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityKeys {
    pub ip: Option<String>,
    pub hostname: Option<String>,
}

/// Extraction des clés d'une entité source.
///
/// `None` signifie que l'entité est hors périmètre (instance terminée) et ne
/// doit pas être ingérée du tout.
pub trait Normalize {
    fn normalize(&self) -> Option<EntityKeys>;
}

/// Premier label d'un nom qualifié, en minuscules. `None` si vide.
pub fn short_hostname(name: &str) -> Option<String> {
    let label = name.trim().split('.').next().unwrap_or_default();
    if label.is_empty() {
        None
    } else {
        Some(label.to_ascii_lowercase())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Normalize for InstanceDescriptor {
    fn normalize(&self) -> Option<EntityKeys> {
        if self.is_terminated() {
            return None;
        }
        Some(EntityKeys {
            ip: non_empty(self.private_ip.as_deref()),
            hostname: self.private_dns_name.as_deref().and_then(short_hostname),
        })
    }
}

impl Normalize for NodeDescriptor {
    fn normalize(&self) -> Option<EntityKeys> {
        Some(EntityKeys {
            ip: non_empty(self.automatic.ipaddress.as_deref()),
            hostname: short_hostname(&self.name),
        })
    }
}

impl Normalize for ServerDescriptor {
    fn normalize(&self) -> Option<EntityKeys> {
        // pas d'IP côté monitoring, appariement par hostname uniquement
        Some(EntityKeys {
            ip: None,
            hostname: self.host.as_deref().and_then(short_hostname),
        })
    }
}
