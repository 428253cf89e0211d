use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{
    analytics::AnalyticsService,
    chat::{ChatCtx, ChatReply, ChatService},
    hospitals::{self, HospitalLocator, NearbyHospital},
    store::HealthStore,
    symptoms::{SymptomAnalyzer, SymptomAssessment},
    types::{AnalyticsSnapshot, ChatKind, ChatRecord},
};

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub analyzer: Arc<SymptomAnalyzer>,
    pub analytics: Arc<AnalyticsService>,
    pub hospitals: Arc<HospitalLocator>,
    pub store: Arc<dyn HealthStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/symptoms/analyze", post(analyze_symptoms))
        .route("/analytics/{user_id}", get(user_analytics))
        .route("/history/{user_id}", get(chat_history))
        .route("/hospitals/nearby", get(nearby_hospitals))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    #[serde(default)]
    pub kind: ChatKind,
    pub content: String,
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, (StatusCode, String)> {
    if request.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "content must not be empty".to_owned()));
    }

    let reply = state
        .chat
        .handle_message(ChatCtx {
            user_id: request.user_id,
            kind: request.kind,
            content: request.content,
            timestamp: Utc::now(),
        })
        .await
        .map_err(internal_error)?;

    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub user_id: Option<String>,
    pub symptoms: String,
}

async fn analyze_symptoms(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<SymptomAssessment>, (StatusCode, String)> {
    if request.symptoms.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "symptoms must not be empty".to_owned()));
    }

    let assessment = state
        .analyzer
        .analyze(request.user_id.as_deref(), &request.symptoms)
        .await
        .map_err(internal_error)?;

    Ok(Json(assessment))
}

async fn user_analytics(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AnalyticsSnapshot>, (StatusCode, String)> {
    let snapshot = state
        .analytics
        .user_analytics(&user_id)
        .await
        .map_err(|error| (StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;

    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub kind: Option<ChatKind>,
}

async fn chat_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatRecord>>, (StatusCode, String)> {
    let messages = state
        .store
        .chat_messages(&user_id, query.kind)
        .await
        .map_err(|error| internal_error(error.into()))?;

    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius: Option<u32>,
}

async fn nearby_hospitals(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Json<Vec<NearbyHospital>> {
    match state
        .hospitals
        .nearby(query.lat, query.lng, query.radius)
        .await
    {
        Ok(results) => Json(results),
        Err(error) => {
            // Emergency surface: answer with the placeholder instead of 5xx.
            warn!(%error, "hospital lookup failed; serving fallback entry");
            Json(hospitals::fallback_hospitals(query.lat, query.lng))
        }
    }
}

fn internal_error(error: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}
