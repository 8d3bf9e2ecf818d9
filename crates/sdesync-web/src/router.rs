//! Web router using Axum

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use sdesync_core::{
    BackupManifest, CancellationFlag, DiffReport, RemovalReport, SdeService, SyncReport,
    SyncStatus,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::sse;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Create the web router
pub fn create_router(service: Arc<SdeService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/events", get(sse_handler))
        .route("/api/projects/{project}/documents", get(documents_handler))
        .route("/api/projects/{project}/sync", post(bulk_sync_handler))
        .route("/api/projects/{project}/documents/sync", post(document_sync_handler))
        .route("/api/projects/{project}/tables/sync", post(tables_sync_handler))
        .route(
            "/api/projects/{project}/facts/{fact_id}/status",
            put(fact_status_handler),
        )
        .route("/api/projects/{project}/backup", post(backup_handler))
        .route("/api/projects/{project}/diff", get(diff_handler))
        .route("/api/projects/{project}/caches", delete(remove_caches_handler))
        .route("/api/projects/{project}/restore", post(restore_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

/// `?documents=a.json,b.json`; absent means every document
#[derive(Debug, Default, Deserialize)]
struct DocumentSelection {
    documents: Option<String>,
}

impl DocumentSelection {
    fn refs(&self) -> Option<Vec<String>> {
        self.documents.as_ref().map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[derive(Debug, Deserialize)]
struct DocumentRequest {
    path: String,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    path: String,
    status: String,
}

async fn health_handler(State(service): State<Arc<SdeService>>) -> Json<serde_json::Value> {
    let config = service.config();
    Json(serde_json::json!({
        "status": "healthy",
        "workspace": config.workspace_root.display().to_string(),
        "valueService": config.service_url.is_some(),
        "subscribers": service.event_bus().subscriber_count(),
    }))
}

/// SSE endpoint for cache change notifications
async fn sse_handler(
    State(service): State<Arc<SdeService>>,
) -> axum::response::Sse<
    impl futures::stream::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>,
> {
    sse::create_sse_stream(service.event_bus().clone())
}

async fn documents_handler(
    State(service): State<Arc<SdeService>>,
    Path(project): Path<String>,
) -> ApiResult<Vec<String>> {
    Ok(Json(service.list_documents(&project)?))
}

async fn bulk_sync_handler(
    State(service): State<Arc<SdeService>>,
    Path(project): Path<String>,
) -> ApiResult<SyncReport> {
    let report = service.bulk_sync(&project, &CancellationFlag::new()).await?;
    Ok(Json(report))
}

async fn document_sync_handler(
    State(service): State<Arc<SdeService>>,
    Path(project): Path<String>,
    Json(request): Json<DocumentRequest>,
) -> ApiResult<SyncReport> {
    Ok(Json(service.sync_document(&project, &request.path).await?))
}

async fn tables_sync_handler(
    State(service): State<Arc<SdeService>>,
    Path(project): Path<String>,
) -> ApiResult<SyncReport> {
    let report = service.sync_tables(&project, &CancellationFlag::new()).await?;
    Ok(Json(report))
}

async fn fact_status_handler(
    State(service): State<Arc<SdeService>>,
    Path((project, fact_id)): Path<(String, String)>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<serde_json::Value> {
    let status: SyncStatus = request.status.parse()?;
    let updated = service
        .update_fact_status(&project, &request.path, &fact_id, status)
        .await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn backup_handler(
    State(service): State<Arc<SdeService>>,
    Path(project): Path<String>,
    Query(selection): Query<DocumentSelection>,
) -> ApiResult<BackupManifest> {
    let refs = selection.refs();
    Ok(Json(service.backup(&project, refs.as_deref()).await?))
}

async fn diff_handler(
    State(service): State<Arc<SdeService>>,
    Path(project): Path<String>,
) -> ApiResult<DiffReport> {
    Ok(Json(service.diff(&project).await?))
}

async fn remove_caches_handler(
    State(service): State<Arc<SdeService>>,
    Path(project): Path<String>,
    Query(selection): Query<DocumentSelection>,
) -> ApiResult<RemovalReport> {
    let refs = selection.refs();
    Ok(Json(service.remove_caches(&project, refs.as_deref()).await?))
}

async fn restore_handler(
    State(service): State<Arc<SdeService>>,
    Path(project): Path<String>,
) -> ApiResult<serde_json::Value> {
    let restored = service.restore_backup(&project).await?;
    Ok(Json(serde_json::json!({ "restored": restored })))
}
