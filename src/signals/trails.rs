use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{clamp_strength, Signal, SignalKind, RELEVANCE_FLOOR};
use crate::error::HiveError;

/// Default number of signals returned by `sense`.
pub const DEFAULT_SENSE_LIMIT: usize = 20;

const DEFAULT_HALF_LIFE: Duration = Duration::from_secs(3600);

/// File-backed signal store with read-time exponential decay.
///
/// Layout:
///   {root}/discoveries/{createdAt}_{id}.json
///   {root}/requests/{createdAt}_{id}.json
///   {root}/metrics/{createdAt}_{id}.json
///
/// Every signal is its own file, so concurrent emitters never touch the
/// same file. Nothing here deletes signals; retention is someone else's job.
pub struct PheromoneTrails {
    root: PathBuf,
    half_life_secs: f64,
}

impl PheromoneTrails {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_half_life(root, DEFAULT_HALF_LIFE)
    }

    /// A zero half-life falls back to the default (one hour).
    pub fn with_half_life(root: impl Into<PathBuf>, half_life: Duration) -> Self {
        let half_life = if half_life.is_zero() {
            warn!("Zero signal half-life requested, using {}s", DEFAULT_HALF_LIFE.as_secs());
            DEFAULT_HALF_LIFE
        } else {
            half_life
        };
        Self {
            root: root.into(),
            half_life_secs: half_life.as_secs_f64(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn half_life_secs(&self) -> f64 {
        self.half_life_secs
    }

    fn dir_for(&self, kind: SignalKind) -> PathBuf {
        self.root.join(kind.partition())
    }

    /// Persists a new signal and returns it.
    ///
    /// `strength` is clamped into `[0, 1]`. Write failures are returned,
    /// never swallowed.
    pub async fn emit(
        &self,
        kind: SignalKind,
        content: &str,
        strength: f64,
    ) -> Result<Signal, HiveError> {
        let signal = Signal {
            id: uuid::Uuid::new_v4().simple().to_string(),
            kind,
            content: content.to_string(),
            strength: clamp_strength(strength),
            created_at: Utc::now().timestamp_millis(),
        };

        let dir = self.dir_for(kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| HiveError::storage(&dir, e))?;

        let file = dir.join(format!("{}_{}.json", signal.created_at, signal.id));
        let body = serde_json::to_string_pretty(&signal)
            .map_err(|e| HiveError::storage(&file, std::io::Error::other(e)))?;
        tokio::fs::write(&file, body)
            .await
            .map_err(|e| HiveError::storage(&file, e))?;

        info!(
            "Emitted {kind} signal {} (strength {:.2})",
            signal.id, signal.strength
        );
        Ok(signal)
    }

    /// Senses signals of one kind using the wall clock.
    pub async fn sense(&self, kind: SignalKind, limit: usize) -> Result<Vec<Signal>, HiveError> {
        self.sense_at(kind, limit, Utc::now().timestamp_millis()).await
    }

    /// Senses signals of one kind as seen at `now_ms`.
    ///
    /// Returns at most `limit` signals whose decayed strength is above the
    /// relevance floor, strongest first, each carrying its decayed strength.
    /// A partition that was never written yields an empty list.
    ///
    /// Records that fail to decode are skipped with a warning; the rest of
    /// the partition is still sensed.
    pub async fn sense_at(
        &self,
        kind: SignalKind,
        limit: usize,
        now_ms: i64,
    ) -> Result<Vec<Signal>, HiveError> {
        let dir = self.dir_for(kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HiveError::storage(&dir, e)),
        };

        let mut sensed = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HiveError::storage(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                // Removed by an external cleaner between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(HiveError::storage(&path, e)),
            };

            let mut signal: Signal = match serde_json::from_str(&raw) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!("Skipping malformed signal record {}: {e}", path.display());
                    continue;
                }
            };

            signal.strength = signal.decayed_strength(now_ms, self.half_life_secs);
            if signal.strength > RELEVANCE_FLOOR {
                sensed.push(signal);
            }
        }

        sensed.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        sensed.truncate(limit);

        debug!(
            "Sensed {} {kind} signal(s) above floor{}",
            sensed.len(),
            if sensed.is_empty() {
                String::new()
            } else {
                format!(
                    ": {}",
                    sensed
                        .iter()
                        .map(|s| format!("{:.3}", s.strength))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        );

        Ok(sensed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes a record directly, bypassing `emit`, to control `created_at`.
    fn plant(root: &Path, kind: SignalKind, id: &str, strength: f64, created_at: i64) {
        let dir = root.join(kind.partition());
        std::fs::create_dir_all(&dir).unwrap();
        let signal = Signal {
            id: id.to_string(),
            kind,
            content: format!("content of {id}"),
            strength,
            created_at,
        };
        std::fs::write(
            dir.join(format!("{created_at}_{id}.json")),
            serde_json::to_string(&signal).unwrap(),
        )
        .unwrap();
    }

    // ── emit ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_emit_writes_one_file_per_signal() {
        let dir = tempfile::tempdir().unwrap();
        let trails = PheromoneTrails::new(dir.path());

        let a = trails.emit(SignalKind::Discovery, "found X", 1.0).await.unwrap();
        let b = trails.emit(SignalKind::Discovery, "found Y", 0.4).await.unwrap();
        assert_ne!(a.id, b.id);

        let files: Vec<_> = std::fs::read_dir(dir.path().join("discoveries"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 2);

        let path = dir
            .path()
            .join("discoveries")
            .join(format!("{}_{}.json", a.created_at, a.id));
        let stored: Signal =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(stored, a);
    }

    #[tokio::test]
    async fn test_emit_clamps_strength() {
        let dir = tempfile::tempdir().unwrap();
        let trails = PheromoneTrails::new(dir.path());

        let high = trails.emit(SignalKind::Metric, "m", 3.0).await.unwrap();
        let low = trails.emit(SignalKind::Metric, "m", -1.0).await.unwrap();
        assert_eq!(high.strength, 1.0);
        assert_eq!(low.strength, 0.0);
    }

    #[tokio::test]
    async fn test_emit_propagates_storage_errors() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the signals root should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let trails = PheromoneTrails::new(&blocker);
        let result = trails.emit(SignalKind::Request, "r", 1.0).await;
        assert!(matches!(result, Err(HiveError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_emits_do_not_lose_records() {
        let dir = tempfile::tempdir().unwrap();
        let trails = std::sync::Arc::new(PheromoneTrails::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let trails = trails.clone();
            handles.push(tokio::spawn(async move {
                trails
                    .emit(SignalKind::Metric, &format!("m{i}"), 0.9)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let sensed = trails.sense(SignalKind::Metric, 100).await.unwrap();
        assert_eq!(sensed.len(), 16);
    }

    // ── sense ────────────────────────────────────────────

    #[tokio::test]
    async fn test_sense_missing_partition_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let trails = PheromoneTrails::new(dir.path().join("never-written"));
        let sensed = trails.sense(SignalKind::Discovery, 20).await.unwrap();
        assert!(sensed.is_empty());
    }

    #[tokio::test]
    async fn test_emit_then_sense_includes_signal() {
        let dir = tempfile::tempdir().unwrap();
        let trails = PheromoneTrails::new(dir.path());

        let emitted = trails.emit(SignalKind::Discovery, "found X", 0.3).await.unwrap();
        let sensed = trails.sense(SignalKind::Discovery, 20).await.unwrap();
        assert_eq!(sensed.len(), 1);
        assert_eq!(sensed[0].id, emitted.id);
        assert!(sensed[0].strength > 0.29 && sensed[0].strength <= 0.3);
    }

    #[tokio::test]
    async fn test_sense_after_one_half_life() {
        let dir = tempfile::tempdir().unwrap();
        let trails = PheromoneTrails::new(dir.path());

        let emitted = trails.emit(SignalKind::Discovery, "found X", 1.0).await.unwrap();
        let sensed = trails
            .sense_at(SignalKind::Discovery, 20, emitted.created_at + 3_600_000)
            .await
            .unwrap();
        assert_eq!(sensed.len(), 1);
        assert!((sensed[0].strength - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sense_does_not_persist_decay() {
        let dir = tempfile::tempdir().unwrap();
        let trails = PheromoneTrails::new(dir.path());

        let emitted = trails.emit(SignalKind::Discovery, "found X", 1.0).await.unwrap();
        trails
            .sense_at(SignalKind::Discovery, 20, emitted.created_at + 3_600_000)
            .await
            .unwrap();

        let fresh = trails
            .sense_at(SignalKind::Discovery, 20, emitted.created_at)
            .await
            .unwrap();
        assert_eq!(fresh[0].strength, 1.0);
    }

    #[tokio::test]
    async fn test_sense_filters_floor_and_sorts_descending() {
        let dir = tempfile::tempdir().unwrap();
        let now = 100_000_000;
        plant(dir.path(), SignalKind::Discovery, "weak", 0.05, now);
        plant(dir.path(), SignalKind::Discovery, "mid", 0.5, now);
        plant(dir.path(), SignalKind::Discovery, "strong", 0.9, now);
        // 0.8 emitted five half-lives ago → 0.025, below the floor
        plant(dir.path(), SignalKind::Discovery, "stale", 0.8, now - 5 * 3_600_000);
        // 1.0 emitted one half-life ago → 0.5 decayed, tied with "mid"
        plant(dir.path(), SignalKind::Discovery, "aged", 1.0, now - 3_600_000);

        let trails = PheromoneTrails::new(dir.path());
        let sensed = trails.sense_at(SignalKind::Discovery, 20, now).await.unwrap();

        let ids: Vec<&str> = sensed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "strong");
        assert!(ids.contains(&"mid"));
        assert!(ids.contains(&"aged"));
        assert!(!ids.contains(&"weak"));
        assert!(!ids.contains(&"stale"));
        for pair in sensed.windows(2) {
            assert!(pair[0].strength >= pair[1].strength);
        }
        for s in &sensed {
            assert!(s.strength > RELEVANCE_FLOOR);
        }
    }

    #[tokio::test]
    async fn test_sense_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let now = 50_000_000;
        for i in 0..10 {
            plant(
                dir.path(),
                SignalKind::Metric,
                &format!("m{i}"),
                0.1 + i as f64 * 0.08,
                now,
            );
        }

        let trails = PheromoneTrails::new(dir.path());
        let sensed = trails.sense_at(SignalKind::Metric, 5, now).await.unwrap();
        assert_eq!(sensed.len(), 5);
        assert_eq!(sensed[0].id, "m9");
        assert_eq!(sensed[4].id, "m5");
    }

    #[tokio::test]
    async fn test_sense_is_partitioned_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let trails = PheromoneTrails::new(dir.path());
        trails.emit(SignalKind::Request, "need help", 1.0).await.unwrap();

        assert!(trails.sense(SignalKind::Discovery, 20).await.unwrap().is_empty());
        assert!(trails.sense(SignalKind::Metric, 20).await.unwrap().is_empty());
        assert_eq!(trails.sense(SignalKind::Request, 20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sense_skips_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let now = 10_000_000;
        plant(dir.path(), SignalKind::Discovery, "good", 0.9, now);
        let partition = dir.path().join("discoveries");
        std::fs::write(partition.join("0_broken.json"), "{ not json").unwrap();
        std::fs::write(partition.join("notes.txt"), "ignored").unwrap();

        let trails = PheromoneTrails::new(dir.path());
        let sensed = trails.sense_at(SignalKind::Discovery, 20, now).await.unwrap();
        assert_eq!(sensed.len(), 1);
        assert_eq!(sensed[0].id, "good");
    }

    #[tokio::test]
    async fn test_custom_half_life() {
        let dir = tempfile::tempdir().unwrap();
        plant(dir.path(), SignalKind::Discovery, "d", 1.0, 0);

        let trails = PheromoneTrails::with_half_life(dir.path(), Duration::from_secs(60));
        let sensed = trails.sense_at(SignalKind::Discovery, 20, 60_000).await.unwrap();
        assert!((sensed[0].strength - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_half_life_falls_back_to_default() {
        let trails = PheromoneTrails::with_half_life("/tmp/x", Duration::ZERO);
        assert_eq!(trails.half_life_secs(), 3600.0);
    }
}
