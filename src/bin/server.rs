use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use text2chart::api_server::{start_server, ApiState};
use text2chart::config::AppConfig;
use text2chart::dataset::DatasetStore;
use text2chart::pipeline::QueryPipeline;
use text2chart::synthesizer::QuerySynthesizer;
use tracing::info;

#[derive(Parser)]
#[command(name = "text2chart-server")]
#[command(about = "Natural-language CSV analytics with chart generation")]
struct Args {
    /// Host to bind the API server on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the API server on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// LLM provider: openai or gemini (or set LLM_PROVIDER env var)
    #[arg(long)]
    provider: Option<String>,

    /// Directory for uploaded CSV files (or set UPLOAD_DIR env var)
    #[arg(long)]
    upload_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(provider) = &args.provider {
        config.provider = provider.parse()?;
    }
    if let Some(upload_dir) = args.upload_dir {
        config.upload_dir = upload_dir;
    }

    info!("Text2Chart starting with provider '{}'", config.provider);

    let store = DatasetStore::new(config.upload_dir.clone());
    let synthesizer = QuerySynthesizer::from_config(&config)?;
    let pipeline = QueryPipeline::new(store, synthesizer);

    let state = ApiState {
        pipeline: Arc::new(pipeline),
    };
    start_server(&args.host, args.port, state).await?;

    Ok(())
}
