/*!
Collaborateurs en mémoire pour tester le réconciliateur sans cloud, serveur de
gestion de configuration ni API monitoring.

Chaque stub est clonable (état partagé), enregistre les appels et suppressions,
et peut échouer ou traîner à la demande.
*/

use async_trait::async_trait;
use fleet_kernel::clients::{ClientError, ClientResult, CloudInventoryClient, ConfigManagementClient, MonitoringClient};
use fleet_kernel::models::{InstanceDescriptor, NodeDescriptor, ServerDescriptor};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Panne simulée sur les appels de lecture
#[derive(Debug, Clone, Default)]
struct Fault {
    error: Option<String>,
    delay: Option<Duration>,
}

impl Fault {
    async fn apply(self) -> ClientResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.error {
            Some(message) => Err(ClientError::Other(message)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct CloudState {
    inventories: HashMap<(String, String), Vec<InstanceDescriptor>>,
    calls: Vec<(String, String)>,
    fault: Fault,
}

#[derive(Clone, Default)]
pub struct MockCloud {
    state: Arc<Mutex<CloudState>>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instances(self, account: &str, region: &str, instances: Vec<InstanceDescriptor>) -> Self {
        self.state
            .lock()
            .inventories
            .insert((account.to_string(), region.to_string()), instances);
        self
    }

    pub fn fail_with(&self, message: &str) {
        self.state.lock().fault.error = Some(message.to_string());
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().fault.delay = Some(delay);
    }

    /// Couples compte/région interrogés, dans l'ordre d'appel
    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl CloudInventoryClient for MockCloud {
    async fn list_instances(&self, account: &str, region: &str) -> ClientResult<Vec<InstanceDescriptor>> {
        let fault = {
            let mut state = self.state.lock();
            state.calls.push((account.to_string(), region.to_string()));
            state.fault.clone()
        };
        fault.apply().await?;

        let key = (account.to_string(), region.to_string());
        Ok(self.state.lock().inventories.get(&key).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct ConfigState {
    nodes: Vec<NodeDescriptor>,
    deleted: Vec<String>,
    failing_deletes: HashSet<String>,
    fault: Fault,
}

#[derive(Clone, Default)]
pub struct MockConfigManagement {
    state: Arc<Mutex<ConfigState>>,
}

impl MockConfigManagement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(self, nodes: Vec<NodeDescriptor>) -> Self {
        self.state.lock().nodes.extend(nodes);
        self
    }

    pub fn fail_with(&self, message: &str) {
        self.state.lock().fault.error = Some(message.to_string());
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().fault.delay = Some(delay);
    }

    pub fn fail_delete(&self, name: &str) {
        self.state.lock().failing_deletes.insert(name.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }
}

#[async_trait]
impl ConfigManagementClient for MockConfigManagement {
    async fn list_environments(&self) -> ClientResult<Vec<String>> {
        let fault = self.state.lock().fault.clone();
        fault.apply().await?;

        let environments: BTreeSet<String> = self.state.lock().nodes.iter().map(|n| n.environment.clone()).collect();
        Ok(environments.into_iter().collect())
    }

    async fn list_nodes(&self, environment: &str) -> ClientResult<Vec<NodeDescriptor>> {
        let fault = self.state.lock().fault.clone();
        fault.apply().await?;

        Ok(self
            .state
            .lock()
            .nodes
            .iter()
            .filter(|n| n.environment == environment)
            .cloned()
            .collect())
    }

    async fn delete_node(&self, name: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.deleted.push(name.to_string());
        if state.failing_deletes.contains(name) {
            return Err(ClientError::Other(format!("refused to delete node {name}")));
        }
        state.nodes.retain(|n| n.name != name);
        tracing::info!("[MOCK] deleted node {}", name);
        Ok(())
    }
}

#[derive(Default)]
struct MonitoringState {
    servers: Vec<ServerDescriptor>,
    deleted: Vec<u64>,
    failing_deletes: HashSet<u64>,
    fault: Fault,
}

#[derive(Clone, Default)]
pub struct MockMonitoring {
    state: Arc<Mutex<MonitoringState>>,
}

impl MockMonitoring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(self, servers: Vec<ServerDescriptor>) -> Self {
        self.state.lock().servers.extend(servers);
        self
    }

    pub fn fail_with(&self, message: &str) {
        self.state.lock().fault.error = Some(message.to_string());
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().fault.delay = Some(delay);
    }

    pub fn fail_delete(&self, id: u64) {
        self.state.lock().failing_deletes.insert(id);
    }

    /// Identifiants passés à `delete_server`, échecs compris
    pub fn deleted(&self) -> Vec<u64> {
        self.state.lock().deleted.clone()
    }
}

#[async_trait]
impl MonitoringClient for MockMonitoring {
    async fn list_servers(&self) -> ClientResult<Vec<ServerDescriptor>> {
        let fault = self.state.lock().fault.clone();
        fault.apply().await?;
        Ok(self.state.lock().servers.clone())
    }

    async fn delete_server(&self, id: u64) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.deleted.push(id);
        if state.failing_deletes.contains(&id) {
            return Err(ClientError::Status {
                status: 500,
                url: format!("mock://servers/{id}"),
            });
        }
        state.servers.retain(|s| s.id != id);
        tracing::info!("[MOCK] deleted server {}", id);
        Ok(())
    }
}
