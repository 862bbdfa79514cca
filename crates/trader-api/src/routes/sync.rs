//! 동기화/백업 endpoint.
//!
//! # 엔드포인트
//!
//! - `GET /sync/status` - 큐 길이, 실행/완료/실패 수, 백업 합계
//! - `POST /sync/tasks` - 작업 제출
//! - `GET /sync/tasks/{id}` - 작업 상태
//! - `GET /backups` - 백업 목록 (최신순)
//! - `POST /backups` - 즉시 백업
//! - `GET /backups/{id}/verify` - 체크섬 검증
//! - `POST /backups/{id}/restore` - 캐시로 복원

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use trader_core::Timeframe;
use trader_data::{
    BackupManifest, BackupType, DataTier, RestoreReport, SyncTask, SystemStatus,
};

use crate::error::{bad_request, data_error, ApiErrorResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub source_type: DataTier,
    pub target_type: DataTier,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub timeframes: Vec<Timeframe>,
    #[serde(default)]
    pub priority: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    /// "full" | "incremental" | "snapshot"
    pub backup_type: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub timeframes: Vec<Timeframe>,
}

#[derive(Debug, Serialize)]
pub struct BackupListResponse {
    pub total: usize,
    pub backups: Vec<BackupManifest>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub backup_id: String,
    pub valid: bool,
}

/// GET /sync/status
pub async fn sync_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(state.sync.system_status().await)
}

/// POST /sync/tasks
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitTaskRequest>,
) -> ApiResult<(StatusCode, Json<SubmitTaskResponse>)> {
    let task = SyncTask::new(
        request.source_type,
        request.target_type,
        request.symbols,
        request.timeframes,
    );
    // 지원하지 않는 방향은 큐에 넣기 전에 거절
    task.kind().map_err(data_error)?;

    let priority = request.priority.unwrap_or(task.priority);
    let task_id = state.sync.submit_new(
        task.source_type,
        task.target_type,
        task.symbols,
        task.timeframes,
        priority,
    );
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { task_id })))
}

/// GET /sync/tasks/{id}
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<SyncTask>> {
    state.sync.task(&task_id).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiErrorResponse::new(
                "TASK_NOT_FOUND",
                format!("Sync task not found: {}", task_id),
            )),
        )
    })
}

/// GET /backups
pub async fn list_backups(State(state): State<Arc<AppState>>) -> Json<BackupListResponse> {
    let backups = state.backups.list_backups().await;
    Json(BackupListResponse {
        total: backups.len(),
        backups,
    })
}

/// POST /backups
pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateBackupRequest>,
) -> ApiResult<(StatusCode, Json<BackupManifest>)> {
    let backup_type =
        BackupType::from_str(&request.backup_type).map_err(|e| bad_request(e.to_string()))?;
    let manifest = state
        .backups
        .create_backup(backup_type, &request.symbols, &request.timeframes)
        .await
        .map_err(data_error)?;
    info!(backup_id = %manifest.backup_id, "Backup created on request");
    Ok((StatusCode::CREATED, Json(manifest)))
}

/// GET /backups/{id}/verify
pub async fn verify_backup(
    State(state): State<Arc<AppState>>,
    Path(backup_id): Path<String>,
) -> ApiResult<Json<VerifyResponse>> {
    state.backups.verify(&backup_id).await.map_err(data_error)?;
    Ok(Json(VerifyResponse {
        backup_id,
        valid: true,
    }))
}

/// POST /backups/{id}/restore
pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    Path(backup_id): Path<String>,
) -> ApiResult<Json<RestoreReport>> {
    state
        .backups
        .restore(&backup_id)
        .await
        .map(Json)
        .map_err(data_error)
}

pub fn sync_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/status", get(sync_status))
        .route("/sync/tasks", post(submit_task))
        .route("/sync/tasks/{id}", get(get_task))
        .route("/backups", get(list_backups).post(create_backup))
        .route("/backups/{id}/verify", get(verify_backup))
        .route("/backups/{id}/restore", post(restore_backup))
}
