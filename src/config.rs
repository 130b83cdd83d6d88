use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hive: HiveConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub design: DesignConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HiveConfig {
    /// Repository root. Scripts, signals and archives resolve against it.
    /// Supports ${ENV_VAR} substitution
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignalsConfig {
    /// Signal directory, relative to the hive root
    #[serde(default = "default_signals_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_half_life_secs")]
    pub half_life_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Without the leading dot, e.g. "sh"
    #[serde(default = "default_script_extension")]
    pub script_extension: String,
    /// Top-level directories under the root that may hold scripts
    #[serde(default = "default_allowed_dirs")]
    pub allowed_dirs: Vec<String>,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Grant the execute bit to scripts that lack it. Disable for strict
    /// deployments: such scripts are then rejected.
    #[serde(default = "default_auto_chmod")]
    pub auto_chmod: bool,
    /// Optional wall-clock limit per script run
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Interpreter-tuning variables removed from the child environment
    #[serde(default = "default_scrubbed_env")]
    pub scrubbed_env: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DesignConfig {
    /// Meta-agent launcher, relative to the hive root
    #[serde(default = "default_design_script")]
    pub script: String,
    /// Where the meta-agent drops generated agents
    #[serde(default = "default_discovered_dir")]
    pub discovered_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_dir")]
    pub dir: PathBuf,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_signals_dir() -> PathBuf {
    PathBuf::from("hive-signals")
}

fn default_half_life_secs() -> u64 {
    3600
}

fn default_interpreter() -> String {
    "bash".to_string()
}

fn default_script_extension() -> String {
    "sh".to_string()
}

fn default_allowed_dirs() -> Vec<String> {
    ["evolution", "dev-tools", "memory", "optimization"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_output_bytes() -> usize {
    200_000
}

fn default_auto_chmod() -> bool {
    true
}

fn default_scrubbed_env() -> Vec<String> {
    ["BASH_ENV", "ENV", "NODE_OPTIONS"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_design_script() -> String {
    "evolution/adas-meta-agent.sh".to_string()
}

fn default_discovered_dir() -> PathBuf {
    PathBuf::from("evolution-archive/discovered")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("evolution-archive")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            dir: default_signals_dir(),
            half_life_secs: default_half_life_secs(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            script_extension: default_script_extension(),
            allowed_dirs: default_allowed_dirs(),
            max_output_bytes: default_max_output_bytes(),
            auto_chmod: default_auto_chmod(),
            timeout_secs: None,
            scrubbed_env: default_scrubbed_env(),
        }
    }
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            script: default_design_script(),
            discovered_dir: default_discovered_dir(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: default_archive_dir(),
        }
    }
}

impl SignalsConfig {
    pub fn half_life(&self) -> Duration {
        Duration::from_secs(self.half_life_secs)
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses TOML content, expanding environment variables like ${HIVE_ROOT}
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the core cannot operate with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.signals.half_life_secs == 0 {
            bail!("signals.half_life_secs must be greater than zero");
        }
        if self.sandbox.max_output_bytes == 0 {
            bail!("sandbox.max_output_bytes must be greater than zero");
        }
        if self.sandbox.allowed_dirs.is_empty() {
            bail!("sandbox.allowed_dirs must list at least one directory");
        }
        if self.sandbox.script_extension.trim_start_matches('.').is_empty() {
            bail!("sandbox.script_extension must not be empty");
        }
        Ok(())
    }

    /// Absolute-or-relative signal directory, anchored at the hive root
    pub fn signals_path(&self) -> PathBuf {
        self.hive.root.join(&self.signals.dir)
    }

    pub fn discovered_path(&self) -> PathBuf {
        self.hive.root.join(&self.design.discovered_dir)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.hive.root.join(&self.archive.dir)
    }

    /// Listen address for the HTTP API
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
