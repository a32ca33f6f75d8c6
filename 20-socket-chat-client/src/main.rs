use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use socket_chat_client::{
    cli::Cli,
    script::{self, ScriptConfig},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ScriptConfig::from(Cli::parse());
    info!("Connecting to {}...", config.endpoint);

    script::run_until(&config, script::default_handlers(), ctrl_c())
        .await
        .with_context(|| format!("chat session with {} failed", config.endpoint))?;

    Ok(())
}
