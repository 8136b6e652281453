//! Inventory clients backed by JSON exports on disk.
//!
//! - Cloud: `<dir>/<account>/<region>.json`, describe-instances layout
//!   (`Reservations[].Instances[]`)
//! - Config management: one JSON array of nodes (knife-style export)

use super::{ClientError, ClientResult, CloudInventoryClient, ConfigManagementClient};
use crate::models::{InstanceDescriptor, NodeDescriptor};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<RawInstance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInstance {
    instance_id: String,
    state: RawState,
    private_ip_address: Option<String>,
    private_dns_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawState {
    name: String,
}

impl From<RawInstance> for InstanceDescriptor {
    fn from(raw: RawInstance) -> Self {
        Self {
            id: raw.instance_id,
            state: raw.state.name,
            private_ip: raw.private_ip_address,
            private_dns_name: raw.private_dns_name,
        }
    }
}

/// Parse un export describe-instances en aplatissant les réservations
pub fn parse_describe_instances(json: &str) -> ClientResult<Vec<InstanceDescriptor>> {
    let parsed: DescribeInstances = serde_json::from_str(json)?;
    Ok(parsed
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .map(InstanceDescriptor::from)
        .collect())
}

/// Client cloud sur exports JSON, avec cache par compte+région possédé par
/// le client (pas d'état global)
pub struct SnapshotCloudClient {
    dir: PathBuf,
    cache: Mutex<HashMap<(String, String), Vec<InstanceDescriptor>>>,
}

impl SnapshotCloudClient {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn snapshot_path(&self, account: &str, region: &str) -> PathBuf {
        self.dir.join(account).join(format!("{region}.json"))
    }
}

#[async_trait]
impl CloudInventoryClient for SnapshotCloudClient {
    async fn list_instances(&self, account: &str, region: &str) -> ClientResult<Vec<InstanceDescriptor>> {
        let key = (account.to_string(), region.to_string());
        if let Some(cached) = self.cache.lock().get(&key) {
            return Ok(cached.clone());
        }

        let path = self.snapshot_path(account, region);
        debug!("querying instances in {} in {} from {:?}", account, region, path);
        if !path.exists() {
            return Err(ClientError::NotFound(format!("cloud snapshot {}", path.display())));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let instances = parse_describe_instances(&content)?;

        self.cache.lock().insert(key, instances.clone());
        Ok(instances)
    }
}

/// Client de gestion de configuration sur un export JSON de noeuds.
/// `delete_node` réécrit l'export.
pub struct SnapshotConfigClient {
    path: PathBuf,
    nodes: RwLock<Option<Vec<NodeDescriptor>>>,
}

impl SnapshotConfigClient {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            nodes: RwLock::new(None),
        }
    }

    async fn load(&self) -> ClientResult<Vec<NodeDescriptor>> {
        if let Some(nodes) = self.nodes.read().await.as_ref() {
            return Ok(nodes.clone());
        }
        if !self.path.exists() {
            return Err(ClientError::NotFound(format!("node export {}", self.path.display())));
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let nodes: Vec<NodeDescriptor> = serde_json::from_str(&content)?;
        info!("loaded {} nodes from {}", nodes.len(), self.path.display());

        *self.nodes.write().await = Some(nodes.clone());
        Ok(nodes)
    }
}

#[async_trait]
impl ConfigManagementClient for SnapshotConfigClient {
    async fn list_environments(&self) -> ClientResult<Vec<String>> {
        let environments: BTreeSet<String> = self.load().await?.into_iter().map(|n| n.environment).collect();
        Ok(environments.into_iter().collect())
    }

    async fn list_nodes(&self, environment: &str) -> ClientResult<Vec<NodeDescriptor>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|n| n.environment == environment)
            .collect())
    }

    async fn delete_node(&self, name: &str) -> ClientResult<()> {
        let mut nodes = self.load().await?;
        let before = nodes.len();
        nodes.retain(|n| n.name != name);
        if nodes.len() == before {
            return Err(ClientError::NotFound(format!("node {name}")));
        }

        let content = serde_json::to_string_pretty(&nodes)?;
        tokio::fs::write(&self.path, content).await?;
        *self.nodes.write().await = Some(nodes);
        info!("deleted node {} from {}", name, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE: &str = r#"{
        "Reservations": [
            {"Instances": [
                {"InstanceId": "i-1", "State": {"Name": "running"},
                 "PrivateIpAddress": "10.0.0.1", "PrivateDnsName": "ip-10-0-0-1.us-west-1.compute.internal"}
            ]},
            {"Instances": [
                {"InstanceId": "i-2", "State": {"Name": "terminated"}, "PrivateDnsName": ""}
            ]}
        ]
    }"#;

    const NODES: &str = r#"[
        {"name": "web1.internal", "chef_environment": "prod", "run_list": ["role[web]"],
         "automatic": {"ipaddress": "10.0.0.1", "hostname": "web1", "ohai_time": 1700000000.0}},
        {"name": "db2", "chef_environment": "staging", "automatic": {}}
    ]"#;

    #[test]
    fn test_parse_describe_instances_flattens_reservations() {
        let instances = parse_describe_instances(DESCRIBE).unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].private_ip.as_deref(), Some("10.0.0.1"));
        assert!(instances[1].is_terminated());
        assert_eq!(instances[1].private_ip, None);
    }

    #[tokio::test]
    async fn test_cloud_snapshot_reads_account_region_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("acme")).unwrap();
        std::fs::write(dir.path().join("acme").join("us-west-1.json"), DESCRIBE).unwrap();

        let client = SnapshotCloudClient::new(dir.path());
        assert_eq!(client.list_instances("acme", "us-west-1").await.unwrap().len(), 2);

        // servi par le cache même si le fichier disparaît
        std::fs::remove_file(dir.path().join("acme").join("us-west-1.json")).unwrap();
        assert_eq!(client.list_instances("acme", "us-west-1").await.unwrap().len(), 2);

        assert!(matches!(
            client.list_instances("acme", "eu-west-1").await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_config_snapshot_environments_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");
        std::fs::write(&path, NODES).unwrap();

        let client = SnapshotConfigClient::new(&path);
        assert_eq!(client.list_environments().await.unwrap(), ["prod", "staging"]);
        assert_eq!(client.list_nodes("prod").await.unwrap()[0].name, "web1.internal");

        client.delete_node("db2").await.unwrap();
        assert!(client.list_nodes("staging").await.unwrap().is_empty());
        assert!(matches!(client.delete_node("db2").await, Err(ClientError::NotFound(_))));

        // l'export sur disque est réécrit
        let reloaded = SnapshotConfigClient::new(&path);
        assert_eq!(reloaded.list_environments().await.unwrap(), ["prod"]);
    }
}
