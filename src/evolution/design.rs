//! Meta-design sessions.
//!
//! Launches the ADAS meta-agent, picks up the newest agent it produced, and
//! keeps it under a session id for later retrieval. Sessions live only as
//! long as the process.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::HiveError;
use crate::sandbox::LocalScriptRunner;

/// A generated agent script and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesignArtifact {
    pub name: String,
    pub script: String,
    pub metadata: Value,
}

pub struct DesignSessions {
    runner: Arc<LocalScriptRunner>,
    script: String,
    discovered_dir: PathBuf,
    extension: String,
    sessions: RwLock<HashMap<String, DesignArtifact>>,
}

impl DesignSessions {
    pub fn new(
        runner: Arc<LocalScriptRunner>,
        script: &str,
        discovered_dir: PathBuf,
        extension: &str,
    ) -> Self {
        Self {
            runner,
            script: script.to_string(),
            discovered_dir,
            extension: extension.trim_start_matches('.').to_string(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Runs the meta-agent and stores its newest artifact.
    ///
    /// Uses `session_id` when given, otherwise a fresh UUID. Returns the id
    /// with the artifact.
    pub async fn launch(
        &self,
        domain: &str,
        iterations: u32,
        session_id: Option<String>,
    ) -> Result<(String, DesignArtifact), HiveError> {
        let id = session_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!("Design session {id}: running {} for '{domain}' ({iterations} iterations)", self.script);
        let output = self
            .runner
            .execute_raw(&self.script, &[domain.to_string(), iterations.to_string()])
            .await?;
        debug!("Meta-agent output:\n{output}");

        let artifact = self.latest_artifact().await?;
        info!("Design session {id}: produced {}", artifact.name);

        self.sessions
            .write()
            .await
            .insert(id.clone(), artifact.clone());
        Ok((id, artifact))
    }

    pub async fn get(&self, session_id: &str) -> Option<DesignArtifact> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Newest script in the discovered directory, with its `.meta.json`.
    pub async fn latest_artifact(&self) -> Result<DesignArtifact, HiveError> {
        let newest = newest_script(&self.discovered_dir, &self.extension).await?;
        let path = newest.ok_or_else(|| {
            HiveError::ArtifactMissing(format!(
                "no .{} scripts in {}",
                self.extension,
                self.discovered_dir.display()
            ))
        })?;

        let script = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| HiveError::storage(&path, e))?;
        let metadata = read_metadata(&path.with_extension("meta.json")).await;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(DesignArtifact {
            name,
            script,
            metadata,
        })
    }
}

async fn newest_script(dir: &Path, extension: &str) -> Result<Option<PathBuf>, HiveError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HiveError::storage(dir, e)),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| HiveError::storage(dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let modified = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .map_err(|e| HiveError::storage(&path, e))?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Missing or unparsable metadata reads as an empty object.
async fn read_metadata(path: &Path) -> Value {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(_) => return Value::Object(Default::default()),
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Ignoring unreadable metadata {}: {e}", path.display());
        Value::Object(Default::default())
    })
}
