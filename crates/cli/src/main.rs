use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fadvisor_core::advisor::Advisor;
use fadvisor_core::analysis::alerts::{scan_symbol, AlertThresholds};
use fadvisor_core::analysis::allocation::calculate_portfolio_allocation;
use fadvisor_core::analysis::overview::get_market_overview;
use fadvisor_core::analysis::{get_technical_indicators, PortfolioAnalyzer};
use fadvisor_core::config::Settings;
use fadvisor_core::domain::Period;
use fadvisor_core::llm::openrouter::OpenRouterClient;
use fadvisor_core::market::yahoo::YahooFinanceClient;
use fadvisor_core::market::MarketDataProvider;
use fadvisor_core::tools::Toolbox;

mod chat;

#[derive(Debug, Parser)]
#[command(name = "fadvisor", about = "Portfolio analysis and an LLM investment assistant")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze holdings from a JSON file (an array, or an object with `holdings`).
    Portfolio {
        #[arg(long)]
        file: PathBuf,
    },
    /// Technical indicators for one symbol.
    Indicators {
        symbol: String,
        /// Lookback window (1mo, 3mo, 6mo, 1y, ...). Defaults to INDICATOR_PERIOD.
        #[arg(long)]
        period: Option<String>,
    },
    /// Major indices and a VIX-based sentiment read.
    Market,
    /// Split an amount across stocks, bonds and cash.
    Allocate {
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "moderate")]
        risk: String,
        #[arg(long = "goal")]
        goals: Vec<String>,
    },
    /// One alert pass over the given symbols.
    Alerts {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Interactive assistant session. Needs OPENROUTER_API_KEY.
    Chat {
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    // stdout carries command output
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args.command, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        return Err(err);
    }
    Ok(())
}

async fn run(command: Command, settings: &Settings) -> anyhow::Result<()> {
    let provider: Arc<dyn MarketDataProvider> = Arc::new(YahooFinanceClient::from_settings(settings)?);

    match command {
        Command::Portfolio { file } => {
            let holdings = read_holdings(&file)?;
            let analyzer = PortfolioAnalyzer::new(provider, &settings.portfolio)?;
            let report = analyzer.analyze_portfolio(&holdings).await;
            tracing::info!(
                holdings = report.holdings.len(),
                failures = report.failures.len(),
                "portfolio analyzed"
            );
            print_json(&report)
        }
        Command::Indicators { symbol, period } => {
            let period: Period = period
                .as_deref()
                .unwrap_or(settings.portfolio.indicator_period.as_str())
                .parse()?;
            let set = get_technical_indicators(provider.as_ref(), &symbol, period, &settings.portfolio.trend_band).await?;
            print_json(&set)
        }
        Command::Market => print_json(&get_market_overview(provider).await),
        Command::Allocate { amount, risk, goals } => {
            print_json(&calculate_portfolio_allocation(amount, &risk, &goals)?)
        }
        Command::Alerts { symbols } => {
            let thresholds = AlertThresholds::default();
            let mut alerts = Vec::new();
            for symbol in &symbols {
                match scan_symbol(provider.as_ref(), symbol, &thresholds).await {
                    Ok(found) => alerts.extend(found),
                    Err(err) => tracing::warn!(%symbol, error = %err, "alert check failed"),
                }
            }
            print_json(&alerts)
        }
        Command::Chat { model } => {
            let mut client = OpenRouterClient::from_settings(settings)?;
            if let Some(model) = model {
                client = client.with_model(model);
            }
            let toolbox = Toolbox::new(provider, &settings.portfolio)?;
            let advisor = Advisor::new(Arc::new(client), toolbox);

            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            chat::run(&advisor, stdin, tokio::io::stdout()).await
        }
    }
}

fn read_holdings(path: &Path) -> anyhow::Result<Vec<Value>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {} failed", path.display()))?;
    parse_holdings(&text).with_context(|| format!("invalid portfolio file {}", path.display()))
}

fn parse_holdings(text: &str) -> anyhow::Result<Vec<Value>> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("holdings") {
            Some(Value::Array(items)) => Ok(items),
            _ => anyhow::bail!("expected a `holdings` array"),
        },
        _ => anyhow::bail!("expected a JSON array of holdings"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
