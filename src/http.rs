//! JSON-over-HTTP surface of the orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::config::Config;
use crate::error::HiveError;
use crate::evolution::{AgentArchive, DesignSessions, HybridController};
use crate::policy::{select_by_features, Mode, ModeFeatures};
use crate::sandbox::{LocalScriptRunner, ScriptParams, ScriptRunner};
use crate::signals::trails::DEFAULT_SENSE_LIMIT;
use crate::signals::{PheromoneTrails, SignalKind};
use crate::thoughts::{process_thoughts, Thought};

const DEFAULT_BEST_AGENTS: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<dyn ScriptRunner>,
    pub trails: Arc<PheromoneTrails>,
    pub controller: Arc<HybridController>,
    pub sessions: Arc<DesignSessions>,
    pub archive: Arc<AgentArchive>,
}

impl AppState {
    /// Wires every component against the configured hive root.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let runner = Arc::new(LocalScriptRunner::new(&config.hive.root, &config.sandbox)?);
        let trails = Arc::new(PheromoneTrails::with_half_life(
            config.signals_path(),
            config.signals.half_life(),
        ));
        let controller = Arc::new(HybridController::new(runner.clone(), trails.clone()));
        let sessions = Arc::new(DesignSessions::new(
            runner.clone(),
            &config.design.script,
            config.discovered_path(),
            &config.sandbox.script_extension,
        ));
        let archive = Arc::new(AgentArchive::new(config.archive_path()));

        Ok(Self {
            runner,
            trails,
            controller,
            sessions,
            archive,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sequential-thoughts", post(sequential_thoughts))
        .route("/hybrid-evolution", post(hybrid_evolution))
        .route("/execute-script", post(execute_script))
        .route("/select-mode", post(select_mode))
        .route("/signals", post(emit_signal))
        .route("/signals/{kind}", get(sense_signals))
        .route("/colony", get(colony))
        .route("/design-agent", post(design_agent))
        .route("/design-agent/{id}", get(get_design))
        .route("/agents/best", get(best_agents))
        .route("/agents/{id}/fitness", post(persist_fitness))
        .with_state(state)
}

// ── errors ──────────────────────────────────────────

pub enum ApiError {
    Hive(HiveError),
    BadRequest(String),
    NotFound(String),
}

impl From<HiveError> for ApiError {
    fn from(e: HiveError) -> Self {
        Self::Hive(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Hive(e) if e.is_client_error() => {
                warn!("Rejected request: {e}");
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            Self::Hive(e) => {
                error!("Request failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `Json` extractor whose rejections use the `{error}` 400 body.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {rejection}");
        Self::BadRequest(rejection.body_text())
    }
}

// ── handlers ────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct ThoughtsBody {
    #[serde(default)]
    thoughts: Vec<Thought>,
}

async fn sequential_thoughts(JsonBody(body): JsonBody<ThoughtsBody>) -> ApiResult<Value> {
    let processed = process_thoughts(&body.thoughts)?;
    Ok(Json(json!(processed)))
}

async fn hybrid_evolution(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ThoughtsBody>,
) -> ApiResult<Value> {
    let res = state.controller.run(&body.thoughts).await?;
    Ok(Json(json!(res)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteBody {
    mode: Mode,
    script_path: String,
    #[serde(default)]
    params: Map<String, Value>,
}

async fn execute_script(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ExecuteBody>,
) -> ApiResult<Value> {
    let params = ScriptParams::from_json(&body.params);
    let output = state
        .runner
        .execute(body.mode, &body.script_path, &params)
        .await?;
    Ok(Json(json!({ "mode": body.mode, "output": output })))
}

async fn select_mode(JsonBody(features): JsonBody<ModeFeatures>) -> Json<Value> {
    Json(json!({ "mode": select_by_features(&features) }))
}

#[derive(Deserialize)]
struct EmitBody {
    kind: SignalKind,
    content: String,
    #[serde(default = "full_strength")]
    strength: f64,
}

fn full_strength() -> f64 {
    1.0
}

async fn emit_signal(State(state): State<AppState>, JsonBody(body): JsonBody<EmitBody>) -> ApiResult<Value> {
    let signal = state
        .trails
        .emit(body.kind, &body.content, body.strength)
        .await?;
    Ok(Json(json!(signal)))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn sense_signals(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Value> {
    let kind: SignalKind = kind
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown signal kind '{kind}'")))?;
    let signals = state
        .trails
        .sense(kind, query.limit.unwrap_or(DEFAULT_SENSE_LIMIT))
        .await?;
    Ok(Json(json!(signals)))
}

async fn colony(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(Json(json!(state.trails.colony_summary().await?)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DesignBody {
    #[serde(default)]
    domain: String,
    #[serde(default)]
    iterations: u32,
    session_id: Option<String>,
}

async fn design_agent(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<DesignBody>,
) -> ApiResult<Value> {
    if body.domain.trim().is_empty() || body.iterations == 0 {
        return Err(ApiError::BadRequest(
            "domain and iterations required".to_string(),
        ));
    }
    let (id, artifact) = state
        .sessions
        .launch(&body.domain, body.iterations, body.session_id)
        .await?;
    Ok(Json(session_json(&id, &artifact)))
}

async fn get_design(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    match state.sessions.get(&id).await {
        Some(artifact) => Ok(Json(session_json(&id, &artifact))),
        None => Err(ApiError::NotFound("session id not found".to_string())),
    }
}

fn session_json(id: &str, artifact: &crate::evolution::DesignArtifact) -> Value {
    json!({
        "sessionId": id,
        "name": artifact.name,
        "script": artifact.script,
        "metadata": artifact.metadata,
    })
}

async fn best_agents(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Value> {
    let agents = state
        .archive
        .best_agents(query.limit.unwrap_or(DEFAULT_BEST_AGENTS))
        .await?;
    Ok(Json(json!(agents)))
}

#[derive(Deserialize)]
struct FitnessBody {
    scores: BTreeMap<String, f64>,
}

async fn persist_fitness(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<FitnessBody>,
) -> ApiResult<Value> {
    let meta = state.archive.persist_fitness(&id, &body.scores).await?;
    Ok(Json(json!(meta)))
}
