//! HTTP surface.
//!
//! Every success is `{"status": "success", ...}`; every failure is
//! `{"status": "error", "detail": ...}` with a 4xx/5xx code.

use crate::agent::{AgentError, PerplexityClient};
use crate::aggregate::Aggregator;
use crate::cache::SummaryCache;
use crate::config::{Config, StorageBackend};
use crate::storage::{CacheStore, MemoryStore, SledStore};
use crate::subject::Subject;
use crate::topic::{Topic, TopicClient};
use crate::translate::{GoogleTranslator, TranslationError, TranslationPass};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub summaries: Arc<SummaryCache>,
    /// Absent when no translation credential is configured
    pub translation: Option<Arc<TranslationPass>>,
}

impl AppState {
    /// Wire the production providers and cache store from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn CacheStore> = match config.storage.backend {
            StorageBackend::Sled => Arc::new(SledStore::open(&config.storage.path)?),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        tracing::info!(backend = store.name(), entries = store.len(), "cache store ready");

        let model = Arc::new(PerplexityClient::new(config)?);
        let topics = Arc::new(TopicClient::new(model, config.agent.domains.clone()));
        let summaries = Arc::new(SummaryCache::new(store.clone(), Aggregator::new(topics)));

        let translation = match GoogleTranslator::new(config) {
            Ok(translator) => {
                let cache = config.translation.cache.then(|| store.clone());
                Some(Arc::new(TranslationPass::new(Arc::new(translator), cache)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "translation disabled");
                None
            }
        };

        Ok(Self {
            summaries,
            translation,
        })
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(&'static str),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Agent(AgentError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Agent(AgentError::ConfigError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Agent(_) => StatusCode::BAD_GATEWAY,
            ApiError::Translation(TranslationError::InvalidLanguage(_)) => StatusCode::BAD_REQUEST,
            ApiError::Translation(TranslationError::ConfigError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Translation(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({"status": "error", "detail": self.to_string()}))).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct Data<T> {
    status: &'static str,
    data: T,
}

fn success<T: Serialize>(data: T) -> Json<Data<T>> {
    Json(Data {
        status: "success",
        data,
    })
}

#[derive(Debug, Deserialize)]
pub struct SubjectQuery {
    name: String,
    province: Option<String>,
    municipality: Option<String>,
}

impl SubjectQuery {
    fn subject(self) -> Result<Subject, ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("name must not be empty".to_string()));
        }
        Ok(Subject::new(self.name).with_locality(self.province, self.municipality))
    }
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    name1: String,
    name2: String,
}

#[derive(Debug, Deserialize)]
pub struct TranslateBody {
    to_translate: Value,
    target_language: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Translated {
    status: &'static str,
    translated_text: Value,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/retrieve/summary", get(retrieve_summary))
        .route("/retrieve/{topic}", get(retrieve_topic))
        .route("/compare", get(compare))
        .route("/trending", get(trending))
        .route("/translate", post(translate))
        .route("/translate-comparison-summary", post(translate_comparison_summary))
        .with_state(state)
}

/// Serve on an already-bound listener until ctrl-c.
pub async fn serve_on(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, state).await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down");
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "success"}))
}

async fn retrieve_summary(
    State(state): State<AppState>,
    query: Result<Query<SubjectQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = query?.0.subject()?;
    let summary = state.summaries.get_or_compute(&subject).await?;
    Ok(success(summary))
}

async fn retrieve_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    query: Result<Query<SubjectQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let topic: Topic = topic
        .parse()
        .map_err(|e: crate::topic::UnknownTopic| ApiError::NotFound(e.to_string()))?;
    let subject = query?.0.subject()?;
    let record = state.summaries.source().fetch(topic, &subject).await?;
    Ok(success(record))
}

async fn compare(
    State(state): State<AppState>,
    query: Result<Query<CompareQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let first = SubjectQuery {
        name: query.name1,
        province: None,
        municipality: None,
    }
    .subject()?;
    let second = SubjectQuery {
        name: query.name2,
        province: None,
        municipality: None,
    }
    .subject()?;

    let (a, b) = state.summaries.compare(&first, &second).await?;
    Ok(success([a, b]))
}

async fn trending(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let trending = state.summaries.trending().await?;
    Ok(success(trending))
}

async fn translate(
    State(state): State<AppState>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let pass = state
        .translation
        .as_ref()
        .ok_or(ApiError::Unavailable("translation is not configured"))?;
    let translated = pass.translate(&body.to_translate, &body.target_language).await?;
    Ok(Json(Translated {
        status: "success",
        translated_text: translated,
    }))
}

async fn translate_comparison_summary(
    State(state): State<AppState>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    if !body.to_translate.get("summary").is_some_and(Value::is_string) {
        return Err(ApiError::BadRequest(
            "to_translate.summary must be a string".to_string(),
        ));
    }
    let pass = state
        .translation
        .as_ref()
        .ok_or(ApiError::Unavailable("translation is not configured"))?;
    let translated = pass
        .translate_comparison(&body.to_translate, &body.target_language)
        .await?;
    Ok(Json(Translated {
        status: "success",
        translated_text: translated,
    }))
}
