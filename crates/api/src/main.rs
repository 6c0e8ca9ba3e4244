use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fadvisor_core::advisor::Advisor;
use fadvisor_core::config::Settings;
use fadvisor_core::llm::openrouter::OpenRouterClient;
use fadvisor_core::llm::LlmClient;
use fadvisor_core::market::yahoo::YahooFinanceClient;
use fadvisor_core::market::MarketDataProvider;
use fadvisor_core::tools::Toolbox;

mod monitor;
mod routes;
mod sessions;

const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let provider: Arc<dyn MarketDataProvider> = Arc::new(YahooFinanceClient::from_settings(&settings)?);

    let advisor = match OpenRouterClient::from_settings(&settings) {
        Ok(client) => {
            let toolbox = Toolbox::new(Arc::clone(&provider), &settings.portfolio)?;
            tracing::info!(model = client.model(), "advisor ready");
            Some(Advisor::new(Arc::new(client), toolbox))
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "LLM not configured; starting API in degraded mode");
            None
        }
    };

    let state = routes::AppState::new(provider, &settings.portfolio, advisor)?;
    let monitors = state.monitors.clone();
    let app = routes::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitors.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
