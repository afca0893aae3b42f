// 统一错误处理

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use crate::autobackup::{BackupError, ErrorCategory};

/// API 错误：包装备份错误，按错误分类映射状态码
#[derive(Debug)]
pub struct ApiError(pub BackupError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        ApiError(err)
    }
}

/// 错误响应体
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: u16,
    category: ErrorCategory,
    message: String,
}

/// 错误分类对应的 HTTP 状态码
fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Permission => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let category = self.0.category();
        let status = status_for(category);
        tracing::error!("请求处理失败（{:?}）: {}", category, self.0);

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            category,
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn response_json(err: BackupError) -> (StatusCode, serde_json::Value) {
        let response = ApiError::from(err).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_permission_error_is_forbidden() {
        let (status, json) =
            response_json(BackupError::PermissionDenied("/home/pi/backups".to_string())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["code"], 403);
        assert_eq!(json["category"], "permission");
        assert!(json["message"].as_str().unwrap().contains("/home/pi/backups"));
    }

    #[tokio::test]
    async fn test_filesystem_error_is_internal() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let (status, json) = response_json(BackupError::from(io_err)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["category"], "resource");

        let (status, json) = response_json(BackupError::Internal("join".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["category"], "internal");
    }

    #[test]
    fn test_display_forwards_backup_error() {
        let err = ApiError(BackupError::NothingToBackup);
        assert_eq!(err.to_string(), BackupError::NothingToBackup.to_string());
    }
}
