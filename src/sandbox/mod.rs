//! Execution sandbox for external evolution scripts.
//!
//! Every invocation goes through the same pipeline:
//!
//! 1. Path containment: the script must live under an allowed top-level
//!    directory of the hive root and carry the approved extension
//! 2. Permission normalization: read access is required; a missing execute
//!    bit is granted (or refused, when auto-chmod is off)
//! 3. Spawn: the interpreter is invoked explicitly, with interpreter-tuning
//!    variables stripped from the environment
//! 4. Bounded capture: stdout and stderr share one buffer; overflowing it
//!    (or the optional timeout) kills the child and keeps the prefix
//!
//! The sandbox never retries.

pub mod params;
pub mod path;
pub mod runner;

use async_trait::async_trait;

use crate::error::HiveError;
use crate::policy::Mode;

pub use params::{build_args, ParamValue, ScriptParams};
pub use path::ScriptPolicy;
pub use runner::LocalScriptRunner;

/// Runs an evolution script in a given mode.
///
/// The orchestrator only talks to this trait, so tests can swap in an
/// in-memory runner.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs `script_path` with `--mode <mode>` and the given parameters,
    /// returning the combined stdout/stderr text.
    async fn execute(
        &self,
        mode: Mode,
        script_path: &str,
        params: &ScriptParams,
    ) -> Result<String, HiveError>;
}
