use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::HiveError;

const META_SUFFIX: &str = ".meta.json";

/// Metadata of one archived agent (`<id>.meta.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness_scores: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<Vec<String>>,
    /// Fields written by the scripts that we carry through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentMetadata {
    /// Mean of all fitness scores, 0 when there are none.
    pub fn average_fitness(&self) -> f64 {
        match &self.fitness_scores {
            Some(scores) if !scores.is_empty() => {
                scores.values().sum::<f64>() / scores.len() as f64
            }
            _ => 0.0,
        }
    }
}

/// Directory of agent metadata files.
pub struct AgentArchive {
    dir: PathBuf,
}

impl AgentArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All readable agents. Unparsable files are skipped.
    pub async fn list_agents(&self) -> Result<Vec<AgentMetadata>, HiveError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HiveError::storage(&self.dir, e)),
        };

        let mut agents = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HiveError::storage(&self.dir, e))?
        {
            let path = entry.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(META_SUFFIX));
            if !is_meta {
                continue;
            }
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(HiveError::storage(&path, e)),
            };
            match serde_json::from_str::<AgentMetadata>(&raw) {
                Ok(meta) => agents.push(meta),
                Err(e) => warn!("Skipping malformed agent metadata {}: {e}", path.display()),
            }
        }
        Ok(agents)
    }

    /// Merges `scores` into the agent's fitness map, creating the file if needed.
    pub async fn persist_fitness(
        &self,
        agent_id: &str,
        scores: &BTreeMap<String, f64>,
    ) -> Result<AgentMetadata, HiveError> {
        validate_agent_id(agent_id)?;
        let path = self.dir.join(format!("{agent_id}{META_SUFFIX}"));

        let mut meta = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Replacing unreadable metadata {}: {e}", path.display());
                AgentMetadata::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => AgentMetadata::default(),
            Err(e) => return Err(HiveError::storage(&path, e)),
        };
        if meta.id.is_empty() {
            meta.id = agent_id.to_string();
        }
        meta.fitness_scores
            .get_or_insert_with(BTreeMap::new)
            .extend(scores.iter().map(|(k, v)| (k.clone(), *v)));

        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| HiveError::storage(&path, std::io::Error::other(e)))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HiveError::storage(&self.dir, e))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| HiveError::storage(&path, e))?;

        info!("Recorded {} fitness score(s) for agent {agent_id}", scores.len());
        Ok(meta)
    }

    /// Top `top_n` agents by average fitness, best first.
    pub async fn best_agents(&self, top_n: usize) -> Result<Vec<AgentMetadata>, HiveError> {
        let mut agents = self.list_agents().await?;
        agents.sort_by(|a, b| b.average_fitness().total_cmp(&a.average_fitness()));
        agents.truncate(top_n);
        Ok(agents)
    }
}

/// Agent ids become file names, so they must be a single plain component.
fn validate_agent_id(id: &str) -> Result<(), HiveError> {
    let plain = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(HiveError::Validation(vec![format!("invalid agent id '{id}'")]))
    }
}
