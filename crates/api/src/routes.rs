use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use fadvisor_core::advisor::Advisor;
use fadvisor_core::analysis::alerts::AlertThresholds;
use fadvisor_core::analysis::indicators::{get_technical_indicators, IndicatorSet, TrendBand};
use fadvisor_core::analysis::overview::{get_market_overview, MarketOverview};
use fadvisor_core::analysis::portfolio::{PortfolioAnalyzer, PortfolioReport};
use fadvisor_core::config::PortfolioSettings;
use fadvisor_core::domain::Period;
use fadvisor_core::error::AnalysisError;
use fadvisor_core::llm::ChatMessage;
use fadvisor_core::market::MarketDataProvider;

use crate::monitor::{MonitorRegistry, MonitorStatus};
use crate::sessions::{SessionKey, SessionStore};

const DEFAULT_MONITOR_INTERVAL_MINUTES: u64 = 60;
/// One week.
const MAX_MONITOR_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn MarketDataProvider>,
    analyzer: PortfolioAnalyzer,
    band: TrendBand,
    default_period: Period,
    /// None when no LLM key is configured; query routes answer 503.
    advisor: Option<Advisor>,
    pub sessions: SessionStore,
    pub monitors: MonitorRegistry,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        settings: &PortfolioSettings,
        advisor: Option<Advisor>,
    ) -> Result<Self, AnalysisError> {
        Ok(Self {
            analyzer: PortfolioAnalyzer::new(Arc::clone(&provider), settings)?,
            provider,
            band: settings.trend_band,
            default_period: settings.indicator_period.parse()?,
            advisor,
            sessions: SessionStore::default(),
            monitors: MonitorRegistry::default(),
        })
    }
}

/// Uniform response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let status = match &err {
            AnalysisError::NoData { .. } => StatusCode::NOT_FOUND,
            AnalysisError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AnalysisError::DataUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AnalysisError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
            timestamp: Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route("/api/query", post(query))
        .route("/api/analyze-portfolio", post(analyze_portfolio))
        .route("/api/indicators/:symbol", get(indicators))
        .route("/api/market-overview", get(market_overview))
        .route("/api/monitor/start", post(start_monitor))
        .route("/api/monitor/:task_id", get(monitor_status).delete(stop_monitor))
        .route("/api/sessions/:user_id/:session_id", get(session_history).delete(delete_session))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "FAdvisor API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/api/query",
            "/api/analyze-portfolio",
            "/api/indicators/:symbol",
            "/api/market-overview",
            "/api/monitor/start",
            "/api/monitor/:task_id",
            "/api/sessions/:user_id/:session_id"
        ]
    }))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::ok(json!({
        "status": "healthy",
        "advisor_ready": state.advisor.is_some(),
        "market_data": state.provider.provider_name(),
        "sessions": state.sessions.len().await,
    })))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

async fn query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> ApiResult<Value> {
    let Some(advisor) = &state.advisor else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "advisor unavailable: OPENROUTER_API_KEY is not configured",
        ));
    };
    let text = req.query.trim();
    if text.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "query must not be empty"));
    }

    let key = SessionKey::new(req.user_id.as_deref(), req.session_id.as_deref());
    let history = state.sessions.get_or_create(&key).await;

    let reply = advisor.ask(&history, text).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %format!("{e:#}"), "advisor query failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
    })?;

    state
        .sessions
        .append(&key, [ChatMessage::user(text), ChatMessage::assistant(reply.clone())])
        .await;

    Ok(ApiResponse::ok(json!({
        "response": reply,
        "session_id": key.session_id,
        "user_id": key.user_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PortfolioRequest {
    holdings: Vec<Value>,
}

async fn analyze_portfolio(
    State(state): State<AppState>,
    Json(req): Json<PortfolioRequest>,
) -> ApiResult<PortfolioReport> {
    let report = state.analyzer.analyze_portfolio(&req.holdings).await;
    Ok(ApiResponse::ok(report))
}

#[derive(Debug, Deserialize)]
pub struct IndicatorParams {
    period: Option<String>,
}

async fn indicators(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<IndicatorParams>,
) -> ApiResult<IndicatorSet> {
    let period = match params.period.as_deref() {
        Some(p) => p.parse::<Period>()?,
        None => state.default_period,
    };
    let set = get_technical_indicators(state.provider.as_ref(), &symbol, period, &state.band).await?;
    Ok(ApiResponse::ok(set))
}

async fn market_overview(State(state): State<AppState>) -> ApiResult<MarketOverview> {
    Ok(ApiResponse::ok(get_market_overview(Arc::clone(&state.provider)).await))
}

#[derive(Debug, Deserialize)]
pub struct MonitorRequest {
    symbols: Vec<String>,
    #[serde(default)]
    thresholds: Option<AlertThresholds>,
    #[serde(default)]
    interval_minutes: Option<u64>,
}

async fn start_monitor(
    State(state): State<AppState>,
    Json(req): Json<MonitorRequest>,
) -> ApiResult<MonitorStatus> {
    let symbols: Vec<String> = req
        .symbols
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect();
    if symbols.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "symbols must not be empty"));
    }
    let minutes = req.interval_minutes.unwrap_or(DEFAULT_MONITOR_INTERVAL_MINUTES);
    if !(1..=MAX_MONITOR_INTERVAL_MINUTES).contains(&minutes) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("interval_minutes must be between 1 and {MAX_MONITOR_INTERVAL_MINUTES}"),
        ));
    }

    let status = state
        .monitors
        .start(
            Arc::clone(&state.provider),
            symbols,
            req.thresholds.unwrap_or_default(),
            Duration::from_secs(minutes * 60),
        )
        .await;
    Ok(ApiResponse::ok(status))
}

async fn monitor_status(State(state): State<AppState>, Path(task_id): Path<String>) -> ApiResult<MonitorStatus> {
    state
        .monitors
        .status(&task_id)
        .await
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("monitoring task {task_id} not found")))
}

async fn stop_monitor(State(state): State<AppState>, Path(task_id): Path<String>) -> ApiResult<Value> {
    if !state.monitors.stop(&task_id).await {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("monitoring task {task_id} not found"),
        ));
    }
    Ok(ApiResponse::ok(json!({
        "message": format!("Monitoring task {task_id} stopped")
    })))
}

async fn session_history(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> ApiResult<Vec<ChatMessage>> {
    let key = SessionKey::new(Some(&user_id), Some(&session_id));
    state
        .sessions
        .get(&key)
        .await
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "session not found"))
}

async fn delete_session(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let key = SessionKey::new(Some(&user_id), Some(&session_id));
    if !state.sessions.delete(&key).await {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "session not found"));
    }
    Ok(ApiResponse::ok(json!({ "message": "session deleted" })))
}
