//! The completion backend: `suggest`, `symbol_locations` and `symbol_source`
//! over JSON.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use linecomp_context::backend::{SUGGEST_ROUTE, SYMBOL_LOCATIONS_ROUTE, SYMBOL_SOURCE_ROUTE};
use linecomp_context::{CompletionService, IndexError, ReferenceFinder, ServiceError, SymbolSourceFetcher};
use linecomp_core::protocol::{
    ErrorBody, SuggestRequest, SuggestResponse, SymbolLocationsRequest, SymbolLocationsResponse,
    SymbolSourceRequest, SymbolSourceResponse, ValidationError,
};
use linecomp_infer::InferError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn CompletionService>,
    pub references: Arc<dyn ReferenceFinder>,
    pub sources: Arc<dyn SymbolSourceFetcher>,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
            ServiceError::Infer(InferError::MissingApiKey(_) | InferError::Config(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Infer(_) | ServiceError::Backend(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err)
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        let status = match &err {
            IndexError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            IndexError::OutsideWorkspace(_) => StatusCode::BAD_REQUEST,
            IndexError::Backend(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "request failed");
        } else {
            tracing::warn!(status = self.status.as_u16(), error = %self.message, "request rejected");
        }
        (self.status, Json(ErrorBody::new(self.message))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(SUGGEST_ROUTE, post(suggest))
        .route(SYMBOL_LOCATIONS_ROUTE, post(symbol_locations))
        .route(SYMBOL_SOURCE_ROUTE, post(symbol_source))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn suggest(
    State(state): State<AppState>,
    Json(request): Json<SuggestRequest>,
) -> Result<Json<SuggestResponse>, ApiError> {
    request.validate()?;
    let response = state.service.suggest(&request).await?;
    tracing::info!(candidates = response.len(), "suggest served");
    Ok(Json(SuggestResponse { response }))
}

async fn symbol_locations(
    State(state): State<AppState>,
    Json(request): Json<SymbolLocationsRequest>,
) -> Result<Json<SymbolLocationsResponse>, ApiError> {
    request.validate()?;
    let references = state
        .references
        .find_references(&request.path, request.start_line, request.end_line)
        .await?;
    Ok(Json(SymbolLocationsResponse { references }))
}

async fn symbol_source(
    State(state): State<AppState>,
    Json(request): Json<SymbolSourceRequest>,
) -> Result<Json<SymbolSourceResponse>, ApiError> {
    request.validate()?;
    let sources = state.sources.fetch_sources(&request.locations).await?;
    Ok(Json(SymbolSourceResponse { sources }))
}

/// Serves until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "completion backend listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "ctrl-c handler failed");
            }
        })
        .await
        .context("completion backend exited with error")
}
