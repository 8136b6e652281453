/*!
Test Harness pour le réconciliateur

Regroupe les trois stubs, une horloge fixe et des réglages de test
(compte `acme`, région `us-west-1`, échéance courte).
*/

use crate::stubs::{MockCloud, MockConfigManagement, MockMonitoring};
use fleet_kernel::config::CloudAccount;
use fleet_kernel::reconciler::{Collaborators, ReconcileOutcome, Reconciler, ReconcilerSettings};
use fleet_kernel::ReconcileResult;
use std::sync::Arc;
use std::time::Duration;
use time::macros::datetime;
use time::OffsetDateTime;

pub const TEST_ACCOUNT: &str = "acme";
pub const TEST_REGION: &str = "us-west-1";

pub struct TestHarness {
    pub cloud: MockCloud,
    pub config: MockConfigManagement,
    pub monitoring: MockMonitoring,
    pub settings: ReconcilerSettings,
    pub now: OffsetDateTime,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        // Init logging pour tests
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();

        let settings = ReconcilerSettings {
            accounts: vec![CloudAccount {
                id: TEST_ACCOUNT.to_string(),
                regions: vec![TEST_REGION.to_string()],
            }],
            call_timeout: Duration::from_secs(2),
            ..ReconcilerSettings::default()
        };

        Self {
            cloud: MockCloud::new(),
            config: MockConfigManagement::new(),
            monitoring: MockMonitoring::new(),
            settings,
            now: datetime!(2026-10-17 12:00 UTC),
        }
    }

    /// Instant relatif à l'horloge fixe
    pub fn days_ago(&self, days: i64) -> OffsetDateTime {
        self.now - time::Duration::days(days)
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            cloud: Arc::new(self.cloud.clone()),
            config: Arc::new(self.config.clone()),
            monitoring: Arc::new(self.monitoring.clone()),
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.collaborators(), self.settings.clone())
    }

    pub async fn run(&self) -> ReconcileResult<ReconcileOutcome> {
        self.reconciler().run(self.now).await
    }
}
