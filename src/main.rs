//! Research Agents - CLI Entry Point
//!
//! Runs the researcher, analyst and writer pipeline on one query.

use std::sync::Arc;

use clap::Parser;
use research_agents::{
    config::Config,
    llm::{LlmClient, OpenRouterClient, RetryingClient},
    pipeline::ResearchPipeline,
    tools::{register_research_tools, ToolRegistry},
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "research-agents", version, about = "Research a question with a team of LLM agents")]
struct Cli {
    /// The research query
    query: String,

    /// Model to use for every agent (overrides MODEL_NAME)
    #[arg(long)]
    model: Option<String>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_agents=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    info!("Loaded configuration: model={}", config.model);

    let llm: Arc<dyn LlmClient> = Arc::new(RetryingClient::new(
        OpenRouterClient::from_config(&config)?,
        config.retry_policy(),
    ));

    let mut registry = ToolRegistry::new();
    register_research_tools(&mut registry);

    info!("Starting research on: {}", cli.query);
    let pipeline = ResearchPipeline::from_config(&config, &registry, llm);
    let report = pipeline.run(&cli.query).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}\n", report.usage);
    println!("================ FINAL OUTPUT ================\n");
    println!("{}", report.final_answer);
    println!("\n==============================================");

    Ok(())
}
