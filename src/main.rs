//!
//! fieldtrack server binary
//! ------------------------
//! Command-line entry point for the fieldtrack auth API. Configuration comes from
//! environment variables; CLI flags override them.

use anyhow::Result;
use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use fieldtrack::config::{ServerConfig, ENV_DATA_FOLDER, ENV_HTTP_PORT, ENV_SWEEP_INTERVAL};

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let _ = fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!(
            "fieldtrack server\n\nUSAGE:\n  fieldtrack_server [--http-port N] [--data-folder PATH] [--sweep-interval SECS]\n\nOPTIONS:\n  --http-port N            HTTP API port (env: {}, default 8081)\n  --data-folder PATH       Snapshot folder (env: {}, default in-memory)\n  --sweep-interval SECS    Expired token sweep, 0 disables (env: {}, default 60)\n",
            ENV_HTTP_PORT, ENV_DATA_FOLDER, ENV_SWEEP_INTERVAL
        );
        return Ok(());
    }

    let config = ServerConfig::from_env().apply_args(&args);
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "fieldtrack {} starting: RUST_LOG='{}', http_port={}, data_folder={:?}",
        env!("CARGO_PKG_VERSION"), rust_log, config.http_port, config.data_folder
    );

    fieldtrack::server::run(config).await
}
