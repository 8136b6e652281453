use serde::Serialize;
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

/// Compteurs d'une passe de réconciliation, publiés en fin de run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub cloud_instances: u32,
    pub cloud_skipped_terminated: u32,
    pub config_nodes: u32,
    pub monitoring_servers: u32,
    /// Entités sans clé exploitable (IP cloud, host monitoring)
    pub ingestion_errors: u32,
    pub hostname_conflicts: u32,
    pub stale_cloud_backed: u32,
    pub config_orphans: u32,
    pub config_orphans_suppressed: u32,
    pub monitoring_orphans: u32,
    pub monitoring_retained: u32,
    pub deletes_performed: u32,
    pub deletes_failed: u32,
    pub hosts: u32,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub duration_ms: u128,
    pub dry_run: bool,
    #[serde(flatten)]
    pub stats: RunStats,
}

/// Suit la durée d'un run, à la manière du HealthTracker
pub struct RunTracker {
    run_id: Uuid,
    started_at: OffsetDateTime,
    start_time: Instant,
}

impl RunTracker {
    pub fn start(started_at: OffsetDateTime) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            start_time: Instant::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn finish(&self, stats: RunStats, dry_run: bool) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            duration_ms: self.start_time.elapsed().as_millis(),
            dry_run,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_summary_flattens_stats() {
        let tracker = RunTracker::start(datetime!(2026-10-17 12:00 UTC));
        let stats = RunStats { hosts: 3, deletes_performed: 1, ..Default::default() };
        let summary = tracker.finish(stats, true);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["hosts"], 3);
        assert_eq!(json["deletes_performed"], 1);
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["started_at"], "2026-10-17T12:00:00Z");
        assert_eq!(json["run_id"], tracker.run_id().to_string());
    }
}
