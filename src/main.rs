//! Margin Lender - Main Entry Point

use anyhow::Result;
use clap::Parser;
use margin_lender::config::Config;
use margin_lender::controller::{CyclePolicy, LendingController};
use margin_lender::exchange::{KucoinClient, LendingVenue};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Margin Lender CLI
#[derive(Parser)]
#[command(name = "margin-lender")]
#[command(version, about = "Automated USDT margin lending on KuCoin")]
struct Cli {
    /// Path to a config file, layered under environment variables
    #[arg(short, long)]
    config: Option<String>,

    /// Validate configuration and exchange connectivity, then exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    info!(
        "Margin Lender v{} starting",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        floor_rate = %config.lending.min_daily_rate,
        reserved = %config.lending.reserved_amount,
        term_days = config.lending.term_days,
        "lending policy loaded"
    );

    let client = KucoinClient::new(&config.kucoin, config.lending.term_days)?;

    if cli.dry_run {
        let available = client.available_balance().await?;
        info!(%available, "dry run: configuration and connectivity OK");
        return Ok(());
    }

    let controller = LendingController::new(
        client,
        &config.lending,
        CyclePolicy::from(&config.timing),
    );

    info!("starting lending cycle controller");
    controller.run().await;

    Ok(())
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "margin-lender.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("margin_lender=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}
