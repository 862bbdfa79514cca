//! 통합 API 에러 응답 타입.
//!
//! 모든 엔드포인트는 같은 에러 본문을 사용합니다.
//!
//! ```json
//! {
//!   "code": "ALL_SOURCES_EXHAUSTED",
//!   "message": "All sources exhausted for BINANCE:BTCUSDT|15|... after 2 attempt(s)",
//!   "details": null,
//!   "timestamp": 1738300800
//! }
//! ```

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trader_data::DataError;

/// 통합 API 에러 응답.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "INVALID_INPUT", "BACKUP_NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 시각 (Unix timestamp)
    pub timestamp: i64,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// 핸들러 에러 타입.
pub type ApiError = (StatusCode, Json<ApiErrorResponse>);

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, ApiError>;

/// 잘못된 요청 파라미터.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::new("INVALID_INPUT", message)),
    )
}

/// [`DataError`]를 HTTP 상태와 에러 코드로 변환합니다.
pub fn data_error(err: DataError) -> ApiError {
    let (status, code) = match &err {
        DataError::AllSourcesExhausted { .. } => (StatusCode::BAD_GATEWAY, "ALL_SOURCES_EXHAUSTED"),
        DataError::InvalidRange(_) | DataError::InvalidTask(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_INPUT")
        }
        DataError::BackupNotFound(_) => (StatusCode::NOT_FOUND, "BACKUP_NOT_FOUND"),
        DataError::ChecksumMismatch { .. } => (StatusCode::CONFLICT, "CHECKSUM_MISMATCH"),
        DataError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
        DataError::Provider(_) | DataError::QualityRejected { .. } => {
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
        }
        DataError::ConfigError(_) => (StatusCode::BAD_REQUEST, "CONFIG_ERROR"),
        DataError::CacheWriteFailure(_)
        | DataError::CacheError(_)
        | DataError::BackupWriteFailure(_)
        | DataError::Io(_)
        | DataError::SerializationError(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };

    let body = match &err {
        DataError::ChecksumMismatch {
            backup_id,
            expected,
            actual,
        } => ApiErrorResponse::with_details(
            code,
            err.to_string(),
            serde_json::json!({
                "backup_id": backup_id,
                "expected": expected,
                "actual": actual,
            }),
        ),
        DataError::AllSourcesExhausted { attempts, .. } => ApiErrorResponse::with_details(
            code,
            err.to_string(),
            serde_json::json!({ "attempts": attempts }),
        ),
        _ => ApiErrorResponse::new(code, err.to_string()),
    };

    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let (status, Json(body)) = data_error(DataError::AllSourcesExhausted {
            key: "k".to_string(),
            attempts: 2,
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, "ALL_SOURCES_EXHAUSTED");
        assert_eq!(body.details.unwrap()["attempts"], 2);

        let (status, _) = data_error(DataError::BackupNotFound("x".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = data_error(DataError::InvalidRange("x".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, Json(body)) = data_error(DataError::ChecksumMismatch {
            backup_id: "b".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.details.unwrap()["expected"], "aa");
    }

    #[test]
    fn test_error_body_shape() {
        let json = serde_json::to_value(ApiErrorResponse::new("INVALID_INPUT", "bad")).unwrap();
        assert_eq!(json["code"], "INVALID_INPUT");
        assert!(json["timestamp"].is_i64());
        assert!(json.get("details").is_none());
    }
}
