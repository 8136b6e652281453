//! Monitoring service client over its v2 REST API
//!
//! Handles:
//! - Paginated server listing (`/v2/servers.json?page=N`, stops on an empty page)
//! - Server deletion
//! - Alert policy and condition lookups

use super::{ClientError, ClientResult, MonitoringClient};
use crate::models::ServerDescriptor;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.newrelic.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPolicy {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub incident_preference: Option<String>,
    /// Milliseconds since epoch
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl AlertPolicy {
    pub fn created(&self) -> Option<OffsetDateTime> {
        self.created_at.and_then(millis_to_datetime)
    }

    pub fn updated(&self) -> Option<OffsetDateTime> {
        self.updated_at.and_then(millis_to_datetime)
    }
}

fn millis_to_datetime(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTerm {
    pub duration: String,
    pub operator: String,
    pub priority: String,
    pub threshold: String,
    pub time_function: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    pub id: u64,
    #[serde(rename = "type")]
    pub condition_type: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub terms: Vec<ConditionTerm>,
}

#[derive(Deserialize)]
struct ServersPage {
    #[serde(default)]
    servers: Vec<ServerDescriptor>,
}

#[derive(Deserialize)]
struct PoliciesPage {
    #[serde(default)]
    policies: Vec<AlertPolicy>,
}

#[derive(Deserialize)]
struct ConditionsPage {
    #[serde(default)]
    conditions: Vec<AlertCondition>,
}

#[derive(Clone)]
pub struct HttpMonitoringClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpMonitoringClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> ClientResult<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn alert_policies(&self) -> ClientResult<Vec<AlertPolicy>> {
        let page: PoliciesPage = self.get_json("/v2/alerts_policies.json", &[]).await?;
        Ok(page.policies)
    }

    /// Politique par nom exact ; erreur si le filtre renvoie plusieurs résultats
    pub async fn alert_policy(&self, name: &str) -> ClientResult<Option<AlertPolicy>> {
        let page: PoliciesPage = self
            .get_json("/v2/alerts_policies.json", &[("filter[name]", name.to_string())])
            .await?;
        let mut policies = page.policies;
        if policies.len() > 1 {
            return Err(ClientError::Ambiguous(format!(
                "finding policy with name {name}: {} matches",
                policies.len()
            )));
        }
        Ok(policies.pop())
    }

    pub async fn conditions_for_policy(&self, policy_id: u64) -> ClientResult<Vec<AlertCondition>> {
        let page: ConditionsPage = self
            .get_json("/v2/alerts_conditions.json", &[("policy_id", policy_id.to_string())])
            .await?;
        Ok(page.conditions)
    }

    /// Serveurs qui ne reportent plus, les plus anciens d'abord
    pub async fn stale_servers(&self) -> ClientResult<Vec<ServerDescriptor>> {
        let mut not_reporting: Vec<_> = self
            .list_servers()
            .await?
            .into_iter()
            .filter(|s| !s.reporting)
            .collect();
        not_reporting.sort_by_key(|s| s.last_reported_at);
        Ok(not_reporting)
    }
}

#[async_trait]
impl MonitoringClient for HttpMonitoringClient {
    async fn list_servers(&self) -> ClientResult<Vec<ServerDescriptor>> {
        let mut servers = Vec::new();
        let mut page = 1u32;
        loop {
            let result: ServersPage = self
                .get_json("/v2/servers.json", &[("page", page.to_string())])
                .await?;
            if result.servers.is_empty() {
                break;
            }
            debug!("fetched {} servers from page {}", result.servers.len(), page);
            servers.extend(result.servers);
            page += 1;
        }
        Ok(servers)
    }

    async fn delete_server(&self, id: u64) -> ClientResult<()> {
        let url = format!("{}/v2/servers/{}.json", self.base_url, id);
        let response = self
            .client
            .delete(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(ClientError::NotFound(format!("server {id}"))),
            status => Err(ClientError::Status {
                status: status.as_u16(),
                url,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_policy_timestamps_are_millis() {
        let policy: AlertPolicy = serde_json::from_str(
            r#"{"id":1,"name":"General Server Health","incident_preference":"PER_POLICY","created_at":1700000000000,"updated_at":1700000000500}"#,
        )
        .unwrap();
        assert_eq!(policy.created(), Some(datetime!(2023-11-14 22:13:20 UTC)));
        assert_eq!(policy.updated(), Some(datetime!(2023-11-14 22:13:20.5 UTC)));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = HttpMonitoringClient::new("https://api.example.com/", " key\n");
        assert_eq!(client.base_url, "https://api.example.com");
        assert_eq!(client.api_key, "key");
    }
}
