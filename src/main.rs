use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use telar_gateway::api::{self, ApiState};
use telar_gateway::channels::WhatsAppChannel;
use telar_gateway::db;
use telar_gateway::inference::{AnomalyPipeline, OnnxModel};
use telar_gateway::llm::OpenAiReplyGenerator;
use telar_gateway::router::MessageRouter;
use telar_gateway::Config;

/// Telar - WhatsApp gateway for garment-factory support and fabric anomaly detection
#[derive(Parser)]
#[command(name = "telar", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "TELAR_PORT", default_value = "8080")]
    port: u16,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,telar_gateway=info",
        1 => "info,telar_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing::info!(port = cli.port, "starting telar gateway");

    let pool = db::init(&config.db_path)?;
    let users = db::UserRepo::new(pool.clone());
    let captures = db::CaptureRepo::new(pool);

    // Models load once and stay immutable for the process lifetime
    let generator = OnnxModel::load(&config.generator_model, "generator")?;
    let discriminator = OnnxModel::load(&config.discriminator_model, "discriminator")?;
    let pipeline = AnomalyPipeline::new(Arc::new(generator), Arc::new(discriminator));

    let channel = Arc::new(WhatsAppChannel::new(
        config.access_token.clone(),
        config.phone_number_id.clone(),
        config.http_timeout,
    )?);
    let replies = Arc::new(OpenAiReplyGenerator::new(
        config.openai_api_key.clone(),
        config.llm_model.clone(),
        config.http_timeout,
    )?);

    let router = MessageRouter::new(
        users,
        captures,
        channel.clone(),
        channel,
        replies,
        pipeline,
    );

    let state = Arc::new(ApiState {
        router,
        verify_token: config.verify_token,
    });

    api::serve(state, cli.port).await?;
    Ok(())
}
