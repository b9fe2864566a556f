use anyhow::{Context, Result};
use pipechain::cli::Cli;
use pipechain::demo::{build_pipeline, report, DemoConfig, LookupRequest};
use pipechain::CancellationToken;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = match &cli.config {
        Some(path) => DemoConfig::from_file(path).context("Failed to load demo config")?,
        None => DemoConfig::default(),
    };

    let pipeline = build_pipeline(&config);
    info!("Loaded pipeline {} [{}]", pipeline.name(), pipeline.stages().join(" -> "));

    let cancel = CancellationToken::new();
    if cli.cancel {
        cancel.cancel();
    }
    let deadline = cli
        .timeout_ms
        .or(config.timeout_ms)
        .map(|ms| cancel.cancel_after(Duration::from_millis(ms)));

    let outcome = pipeline
        .run(
            LookupRequest {
                user: cli.user.clone(),
            },
            &cancel,
        )
        .await;

    if let Some(deadline) = deadline {
        deadline.abort();
    }

    println!("{}", serde_json::to_string_pretty(&report(&outcome))?);

    if outcome.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
