//! Browser Agent - command line entry point
//!
//! Runs a single task given on the command line and prints the result.

use browser_agent::{BrowserAgent, Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "browser_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let task = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if task.trim().is_empty() {
        anyhow::bail!("usage: browser-agent <task description>");
    }

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, max_steps={}, tool host={}",
        config.default_model, config.max_steps, config.mcp.command
    );

    let result = BrowserAgent::from_config(&config).run_once(&task).await?;
    println!("{}", result);

    Ok(())
}
