//! Staleness policy: a 45-day freshness window for config-management check-ins
//! and monitoring reports.

use crate::models::NodeDescriptor;
use crate::registry::InstanceIdentityIndex;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{error, warn};

pub const DEFAULT_STALENESS_DAYS: i64 = 45;
/// Bornes acceptées pour la fenêtre, en jours
pub const MIN_STALENESS_DAYS: i64 = 1;
pub const MAX_STALENESS_DAYS: i64 = 3650;

/// Why an entity ended up as a candidate orphan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReason {
    /// No discovered IP or no check-in timestamp
    NeverCheckedIn,
    /// Last check-in older than the window, no live cloud instance
    StaleCheckIn,
    /// Hostname not found in the registry
    NoHostnameMatch,
}

/// Node validity verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeValidity {
    Fresh,
    /// Stale, but its cloud instance is alive: the agent is just not running
    StaleCloudBacked,
    StaleOrphan(OrphanReason),
}

impl NodeValidity {
    /// Fresh and cloud-backed nodes are merged into the registry
    pub fn is_valid(&self) -> bool {
        !matches!(self, NodeValidity::StaleOrphan(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    window: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_STALENESS_DAYS)
    }
}

impl StalenessPolicy {
    /// Fenêtre ramenée dans `[MIN_STALENESS_DAYS, MAX_STALENESS_DAYS]`
    pub fn from_days(days: i64) -> Self {
        Self {
            window: Duration::days(days.clamp(MIN_STALENESS_DAYS, MAX_STALENESS_DAYS)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `now - last_seen <= window`
    pub fn is_fresh(&self, last_seen: OffsetDateTime, now: OffsetDateTime) -> bool {
        now - last_seen <= self.window
    }

    pub fn validate(
        &self,
        node: &NodeDescriptor,
        instances: &InstanceIdentityIndex,
        now: OffsetDateTime,
    ) -> NodeValidity {
        let attrs = &node.automatic;
        let last_check_in = match (attrs.ipaddress.as_deref(), attrs.last_check_in()) {
            (Some(ip), Some(ts)) if !ip.trim().is_empty() => ts,
            _ => {
                error!(node = %node.name, "node never checked in");
                return NodeValidity::StaleOrphan(OrphanReason::NeverCheckedIn);
            }
        };

        if self.is_fresh(last_check_in, now) {
            return NodeValidity::Fresh;
        }

        error!(
            node = %node.name,
            last_check_in = %last_check_in,
            "node has not been updated in over {} days",
            self.window.whole_days()
        );
        match attrs.instance_id() {
            Some(instance_id) if instances.contains(instance_id) => {
                warn!(
                    node = %node.name,
                    instance_id = %instance_id,
                    "node is a valid cloud instance and is not running the agent"
                );
                NodeValidity::StaleCloudBacked
            }
            _ => NodeValidity::StaleOrphan(OrphanReason::StaleCheckIn),
        }
    }
}
