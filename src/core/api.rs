//! HTTP API for Probe0
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /config/default - Default test configuration
//! - POST /score - Score a trial list
//! - POST /session/simulate - Run a seeded virtual session and keep it
//! - GET /session/{id} - Session summary
//! - GET /session/{id}/report - Scored dataset
//! - GET /session/{id}/log - Event log as text

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::core::config::{builtin_stimuli, validate_stimuli, TestConfig};
use crate::core::journal::EventLog;
use crate::core::orchestrator::simulate;
use crate::core::responder::RespondentProfile;
use crate::core::scoring::ScoringEngine;
use crate::core::session::{session_id, SessionState};
use crate::types::{ScoredDataset, StimulusSpec, TrialResult, ValidationResult};

/// A finished simulated session
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub id: String,
    pub seed: u64,
    pub started: DateTime<Utc>,
    pub finished: bool,
    pub results: Vec<TrialResult>,
    pub log_text: String,
    pub dataset: ScoredDataset,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, StoredSession>>,
    /// Ids handed to simulations that are still running
    pub reserved: Mutex<HashSet<String>>,
    /// Used when a request carries no config
    pub defaults: TestConfig,
}

/// Simulate request; every field optional
#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    pub seed: Option<u64>,
    pub respondent: Option<u32>,
    pub config: Option<TestConfig>,
    pub stimuli: Option<Vec<StimulusSpec>>,
    pub profile: Option<RespondentProfile>,
}

/// Simulate response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub session_id: String,
    pub trials: usize,
    pub finished: bool,
    pub log_digest: String,
}

/// Session summary response
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub seed: u64,
    pub started: DateTime<Utc>,
    pub finished: bool,
    pub trials: usize,
    pub misses: usize,
    pub unreliable: Vec<String>,
    pub log_digest: String,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_stored: usize,
}

/// Create the API router
pub fn create_router(defaults: TestConfig) -> Router {
    let state = Arc::new(AppState {
        sessions: RwLock::new(HashMap::new()),
        reserved: Mutex::new(HashSet::new()),
        defaults,
    });

    Router::new()
        .route("/health", get(health))
        .route("/config/default", get(default_config))
        .route("/score", post(score))
        .route("/session/simulate", post(simulate_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/report", get(get_report))
        .route("/session/:id/log", get(get_log))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_stored: sessions.len(),
    })
}

async fn default_config(State(state): State<Arc<AppState>>) -> Json<TestConfig> {
    Json(state.defaults.clone())
}

/// Score a posted trial list (same shape as trials.json)
async fn score(Json(results): Json<Vec<TrialResult>>) -> Json<ScoredDataset> {
    Json(ScoringEngine::new().score(&results))
}

/// Run a virtual session with a simulated respondent
///
/// The session store is locked only to reserve the id and to insert the
/// finished session; the run itself happens on a blocking thread.
async fn simulate_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, Response> {
    let config = req.config.unwrap_or_else(|| state.defaults.clone());
    let check = config.validate();
    if !check.is_valid() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, Json(check)).into_response());
    }
    let stimuli = req.stimuli.unwrap_or_else(|| builtin_stimuli(&config.lang));
    let check = validate_stimuli(&stimuli);
    if !check.is_valid() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, Json(check)).into_response());
    }

    let seed = req.seed.unwrap_or(0);
    let started = Utc::now();
    let id = reserve_id(&state, session_id(req.respondent.unwrap_or(1), started)).await;

    let profile = req.profile.unwrap_or_default();
    let run_id = id.clone();
    let run = tokio::task::spawn_blocking(move || {
        let session = SessionState::new(run_id, config, stimuli, EventLog::new(started), seed);
        let mut session = simulate(session, seed, profile);
        let end = session.ended_ms.unwrap_or(0);
        let dataset = ScoringEngine::new().score_session(&mut session, end);
        (session, dataset)
    })
    .await;

    let mut sessions = state.sessions.write().await;
    state.reserved.lock().await.remove(&id);
    let (session, dataset) = match run {
        Ok(done) => done,
        Err(e) => {
            error!(session = %id, error = %e, "simulation failed");
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };
    info!(session = %id, trials = session.results.len(), "simulated session stored");

    let response = SimulateResponse {
        session_id: id.clone(),
        trials: session.results.len(),
        finished: session.finished,
        log_digest: dataset.log_digest.clone(),
    };
    sessions.insert(
        id.clone(),
        StoredSession {
            id,
            seed,
            started,
            finished: session.finished,
            log_text: session.log.to_text(),
            results: session.results,
            dataset,
        },
    );
    Ok(Json(response))
}

/// Get session summary
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(SessionSummary {
        session_id: id,
        seed: session.seed,
        started: session.started,
        finished: session.finished,
        trials: session.results.len(),
        misses: session.results.iter().filter(|r| r.miss).count(),
        unreliable: session.dataset.unreliable.clone(),
        log_digest: session.dataset.log_digest.clone(),
    }))
}

async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScoredDataset>, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(session.dataset.clone()))
}

async fn get_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        session.log_text.clone(),
    ))
}

/// Claim an id no stored or running session uses
async fn reserve_id(state: &AppState, base: String) -> String {
    let sessions = state.sessions.read().await;
    let mut reserved = state.reserved.lock().await;
    let id = unique_id(|candidate| sessions.contains_key(candidate) || reserved.contains(candidate), base);
    reserved.insert(id.clone());
    id
}

/// Session ids have one-second resolution; suffix repeats
fn unique_id(taken: impl Fn(&str) -> bool, base: String) -> String {
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken(candidate.as_str()))
        .unwrap_or(base)
}

/// Run the API server
pub async fn run_server(addr: &str, defaults: TestConfig) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(defaults);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");
    println!("Probe0 API running on {}", addr);
    println!("  GET  /health              - Health check");
    println!("  GET  /config/default      - Default configuration");
    println!("  POST /score               - Score a trial list");
    println!("  POST /session/simulate    - Run a simulated session");
    println!("  GET  /session/:id         - Session summary");
    println!("  GET  /session/:id/report  - Scored dataset");
    println!("  GET  /session/:id/log     - Event log");
    axum::serve(listener, router).await?;
    Ok(())
}
