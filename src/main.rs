use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hive_orchestrator::config::Config;
use hive_orchestrator::http::{self, AppState};

fn print_help() {
    println!(
        "\
hive-orchestrator v{}

Pheromone-guided mode selection and sandboxed script dispatch for hybrid
evolution runs.

USAGE:
    hive-orchestrator [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/hive.toml]

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG     Log level filter for tracing
                 (e.g. debug, hive_orchestrator=debug,warn)
    HIVE_ROOT    Conventional variable for [hive] root

EXAMPLES:
    hive-orchestrator                        # uses config/hive.toml
    hive-orchestrator /etc/hive/hive.toml    # custom config path
    RUST_LOG=debug hive-orchestrator         # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("hive-orchestrator v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hive_orchestrator=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/hive.toml".to_string());

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {config_path}"))?;

    info!("Hive root: {}", config.hive.root.display());
    info!(
        "Signals: {} (half-life {}s)",
        config.signals_path().display(),
        config.signals.half_life_secs
    );
    info!(
        "Sandbox: {} .{} scripts under {}",
        config.sandbox.interpreter,
        config.sandbox.script_extension,
        config.sandbox.allowed_dirs.join(", ")
    );
    info!(
        "Output ceiling: {} bytes, auto-chmod {}",
        config.sandbox.max_output_bytes,
        if config.sandbox.auto_chmod { "on" } else { "off" }
    );
    if let Some(timeout) = config.sandbox.timeout() {
        info!("Script timeout: {}s", timeout.as_secs());
    }

    let state = AppState::from_config(&config)?;
    let app = http::router(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, exiting");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
