//! Per-partition signal counts for monitoring.

use std::io::ErrorKind;

use chrono::Utc;
use serde::Serialize;

use super::{PheromoneTrails, SignalKind};
use crate::error::HiveError;

/// Raw entry counts in each partition, decayed or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColonySummary {
    pub discoveries: usize,
    pub requests: usize,
    pub metrics: usize,
    /// Epoch milliseconds
    pub last_updated: i64,
}

impl PheromoneTrails {
    /// Counts stored entries per partition. A missing partition counts 0.
    pub async fn colony_summary(&self) -> Result<ColonySummary, HiveError> {
        Ok(ColonySummary {
            discoveries: self.count(SignalKind::Discovery).await?,
            requests: self.count(SignalKind::Request).await?,
            metrics: self.count(SignalKind::Metric).await?,
            last_updated: Utc::now().timestamp_millis(),
        })
    }

    async fn count(&self, kind: SignalKind) -> Result<usize, HiveError> {
        let dir = self.root().join(kind.partition());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(HiveError::storage(&dir, e)),
        };
        let mut count = 0;
        while entries
            .next_entry()
            .await
            .map_err(|e| HiveError::storage(&dir, e))?
            .is_some()
        {
            count += 1;
        }
        Ok(count)
    }
}
