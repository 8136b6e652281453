//! Couverture monitoring d'un environnement de gestion de configuration :
//! pour chaque noeud, le serveur monitoring correspondant (par hostname) ou rien.

use crate::models::{NodeDescriptor, ServerDescriptor};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageEntry {
    pub node_name: String,
    pub server_id: Option<u64>,
}

/// Correspondance sur `automatic.hostname` et le `host` du serveur, tels quels
pub fn monitored_nodes(nodes: &[NodeDescriptor], servers: &[ServerDescriptor]) -> Vec<CoverageEntry> {
    let by_host: HashMap<&str, u64> = servers
        .iter()
        .filter_map(|s| s.host.as_deref().map(|h| (h, s.id)))
        .collect();

    nodes
        .iter()
        .map(|node| CoverageEntry {
            node_name: node.name.clone(),
            server_id: node
                .automatic
                .hostname
                .as_deref()
                .and_then(|h| by_host.get(h).copied()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AutomaticAttributes;

    fn node(name: &str, hostname: Option<&str>) -> NodeDescriptor {
        NodeDescriptor {
            name: name.into(),
            environment: "prod".into(),
            run_list: vec![],
            automatic: AutomaticAttributes {
                hostname: hostname.map(str::to_string),
                ..Default::default()
            },
        }
    }

    fn server(id: u64, host: &str) -> ServerDescriptor {
        ServerDescriptor {
            id,
            account_id: 1,
            name: host.into(),
            host: Some(host.into()),
            reporting: true,
            last_reported_at: None,
        }
    }

    #[test]
    fn test_monitored_nodes() {
        let nodes = vec![node("web1.internal", Some("web1")), node("db2", Some("db2")), node("bare", None)];
        let servers = vec![server(7, "web1"), server(8, "cache1")];

        let coverage = monitored_nodes(&nodes, &servers);
        assert_eq!(
            coverage,
            vec![
                CoverageEntry { node_name: "web1.internal".into(), server_id: Some(7) },
                CoverageEntry { node_name: "db2".into(), server_id: None },
                CoverageEntry { node_name: "bare".into(), server_id: None },
            ]
        );
    }
}
