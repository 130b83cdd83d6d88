//! Script path containment.
//!
//! Resolution is purely lexical and touches no filesystem, so a rejected
//! path never reaches chmod or spawn.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::HiveError;

#[derive(Debug, Clone)]
pub struct ScriptPolicy {
    /// Absolute, normalized hive root
    root: PathBuf,
    allowed_dirs: Vec<String>,
    /// Without the leading dot
    extension: String,
}

impl ScriptPolicy {
    /// `root` must be absolute; it is normalized here.
    pub fn new(root: &Path, allowed_dirs: Vec<String>, extension: &str) -> Self {
        Self {
            root: normalize(root),
            allowed_dirs,
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a script path, absolute or relative to the root.
    ///
    /// The normalized target must sit inside one of the allowed top-level
    /// directories and carry the approved extension.
    pub fn resolve(&self, script_path: &str) -> Result<PathBuf, HiveError> {
        let requested = Path::new(script_path);
        let absolute = if requested.is_absolute() {
            normalize(requested)
        } else {
            normalize(&self.root.join(requested))
        };

        let relative = match absolute.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => {
                warn!("Rejected script outside hive root: {script_path}");
                return Err(HiveError::PathNotAllowed(script_path.to_string()));
            }
        };

        let mut components = relative.components();
        let top = match components.next() {
            Some(Component::Normal(top)) => top.to_string_lossy(),
            _ => return Err(HiveError::PathNotAllowed(script_path.to_string())),
        };
        // The allowed directory itself is not a script
        if components.next().is_none() || !self.allowed_dirs.iter().any(|d| *d == top) {
            warn!("Rejected script outside allowed directories: {script_path}");
            return Err(HiveError::PathNotAllowed(relative.display().to_string()));
        }

        if absolute.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
            return Err(HiveError::UnsupportedScriptType {
                path: script_path.to_string(),
                extension: self.extension.clone(),
            });
        }

        Ok(absolute)
    }
}

/// Folds `.` and `..` without consulting the filesystem.
/// `..` never climbs above the filesystem root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component)
            }
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
        }
    }
    out
}
