use anyhow::{Context, Result};
use atelier::adapter::ProcessAdapter;
use atelier::classify::{AnthropicClient, CompletionClient, ModelInputClassifier, ModelStatusClassifier};
use atelier::cli::Cli;
use atelier::config::Config;
use atelier::orchestrator::Orchestrator;
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Fail before the terminal is taken over
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    atelier::logging::init(&config);

    let working_directory = match cli.workdir.clone() {
        Some(path) => path,
        None => std::env::current_dir().context("could not determine current directory")?,
    };

    let client: Arc<dyn CompletionClient> = Arc::new(
        AnthropicClient::new(config.model.clone(), config.api_key.clone())
            .context("could not build classifier client")?,
    );
    let orchestrator = Orchestrator::new(
        Arc::new(ProcessAdapter::new()),
        Arc::new(ModelInputClassifier::new(client.clone())),
        Arc::new(ModelStatusClassifier::new(client)),
        working_directory,
        cli.agent_kind(),
    );

    atelier::tui::run(orchestrator).await?;
    Ok(())
}
