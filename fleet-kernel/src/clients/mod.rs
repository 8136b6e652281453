/**
 * CLIENTS - Interfaces des collaborateurs externes du moteur
 *
 * RÔLE :
 * Le moteur ne parle qu'à ces trois traits. Les implémentations concrètes
 * (HTTP pour le monitoring, exports JSON pour le cloud et la gestion de
 * configuration) et les stubs du devkit sont interchangeables.
 *
 * FONCTIONNEMENT :
 * - CloudInventoryClient = instances par compte/région
 * - ConfigManagementClient = environnements, noeuds, suppression de noeud
 * - MonitoringClient = serveurs (paginés), suppression de serveur
 */

pub mod monitoring;
pub mod snapshot;

use crate::models::{InstanceDescriptor, NodeDescriptor, ServerDescriptor};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

pub use monitoring::HttpMonitoringClient;
pub use snapshot::{SnapshotCloudClient, SnapshotConfigClient};

/// Erreurs possibles lors des appels aux collaborateurs
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("ambiguous result: {0}")]
    Ambiguous(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Échéance d'un appel ; dépassement = `ClientError::Timeout`
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ClientError::Timeout(timeout)))
}

#[async_trait]
pub trait CloudInventoryClient: Send + Sync {
    /// Toutes les instances (toutes réservations confondues) d'un compte/région
    async fn list_instances(&self, account: &str, region: &str) -> ClientResult<Vec<InstanceDescriptor>>;
}

#[async_trait]
pub trait ConfigManagementClient: Send + Sync {
    async fn list_environments(&self) -> ClientResult<Vec<String>>;

    async fn list_nodes(&self, environment: &str) -> ClientResult<Vec<NodeDescriptor>>;

    async fn delete_node(&self, name: &str) -> ClientResult<()>;
}

#[async_trait]
pub trait MonitoringClient: Send + Sync {
    /// Tous les serveurs, pagination comprise (arrêt sur page vide)
    async fn list_servers(&self) -> ClientResult<Vec<ServerDescriptor>>;

    async fn delete_server(&self, id: u64) -> ClientResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout() {
        assert_eq!(with_timeout(Duration::from_secs(1), async { Ok(3) }).await.unwrap(), 3);

        let slow = with_timeout::<(), _>(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(slow, Err(ClientError::Timeout(_))));
    }
}
