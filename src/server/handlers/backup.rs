//! 备份 API 处理器

use axum::{extract::State, Json};
use serde::Serialize;

use crate::autobackup::{ArchiveInfo, ManagerStatus};
use crate::server::{ApiResult, AppState};

/// 备份成功时的响应文本
pub const BACKUP_SUCCESS_TEXT: &str = "Backup completed successfully!";

/// 备份失败时的响应文本
pub const BACKUP_FAILED_TEXT: &str = "Backup failed!";

/// 手动触发备份
///
/// 同步等待备份结束；已有备份在执行时视为失败
pub async fn trigger_backup(State(state): State<AppState>) -> &'static str {
    let outcome = state.autobackup_manager.trigger_backup_manual().await;
    if outcome.is_success() {
        BACKUP_SUCCESS_TEXT
    } else {
        BACKUP_FAILED_TEXT
    }
}

/// 获取备份状态
pub async fn get_backup_status(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<ManagerStatus>>> {
    let status = state.autobackup_manager.get_status();
    Ok(Json(ApiResponse::success(status)))
}

/// 列出现有归档
pub async fn list_archives(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<ArchiveInfo>>>> {
    let archives = state.autobackup_manager.list_archives().await?;
    Ok(Json(ApiResponse::success(archives)))
}

// ==================== 响应类型 ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autobackup::BackupConfig;
    use crate::server::build_router;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router(root: &Path, with_item: bool) -> (Router, AppState) {
        let item = root.join("config.toml");
        if with_item {
            std::fs::write(&item, "main.name = 'gotchi'").unwrap();
        }
        let backup = BackupConfig {
            enabled: false,
            backup_on_boot: false,
            backup_path: root.join("backups"),
            hostname: Some("gotchi".to_string()),
            items: Some(vec![item]),
            ..Default::default()
        };
        let state = AppState::new(backup).unwrap();
        (build_router(state.clone()), state)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_backup() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/backup")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_trigger_backup_success() {
        let temp_dir = TempDir::new().unwrap();
        let (app, state) = test_router(temp_dir.path(), true);

        let response = app.oneshot(post_backup()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, BACKUP_SUCCESS_TEXT);

        let archives = state.autobackup_manager.list_archives().await.unwrap();
        assert_eq!(archives.len(), 1);
    }

    #[tokio::test]
    async fn test_trigger_backup_failure() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _state) = test_router(temp_dir.path(), false);

        let response = app.oneshot(post_backup()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, BACKUP_FAILED_TEXT);
    }

    #[tokio::test]
    async fn test_trigger_backup_while_running() {
        let temp_dir = TempDir::new().unwrap();
        let (app, state) = test_router(temp_dir.path(), true);

        let guard = state.autobackup_manager.runner().try_begin().unwrap();
        let response = app.oneshot(post_backup()).await.unwrap();
        assert_eq!(body_text(response).await, BACKUP_FAILED_TEXT);
        drop(guard);

        assert!(state.autobackup_manager.list_archives().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_and_archives() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _state) = test_router(temp_dir.path(), true);

        let response = app.clone().oneshot(post_backup()).await.unwrap();
        assert_eq!(body_text(response).await, BACKUP_SUCCESS_TEXT);

        let request = Request::builder()
            .uri("/api/v1/backup/status")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["enabled"], false);
        assert_eq!(json["data"]["runner"]["execution_count"], 1);

        let request = Request::builder()
            .uri("/api/v1/backup/archives")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        let archives = json["data"].as_array().unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives[0]["name"]
            .as_str()
            .unwrap()
            .starts_with("gotchi_backup_"));
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _state) = test_router(temp_dir.path(), true);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(body_text(response).await, "OK");
    }

}
