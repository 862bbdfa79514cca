//! 데이터 모듈 오류 타입.
//!
//! 병합된 조회의 대기자들이 선도 요청의 오류를 그대로 받을 수 있도록
//! 모든 변형은 문자열 페이로드만 가지며 `Clone`입니다.

use thiserror::Error;
use trader_exchange::ProviderError;

/// 데이터 관련 오류.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// 업스트림 제공자 오류
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// 품질 점수가 요구 수준에 미달
    #[error("Quality rejected from {provider}: score {score:.4} < {threshold:.4}")]
    QualityRejected {
        provider: String,
        score: f64,
        threshold: f64,
    },

    /// 모든 제공자 시도 실패
    #[error("All sources exhausted for {key} after {attempts} attempt(s)")]
    AllSourcesExhausted { key: String, attempts: usize },

    /// 캐시 쓰기 실패
    #[error("Cache write failure: {0}")]
    CacheWriteFailure(String),

    /// 캐시 오류
    #[error("Cache error: {0}")]
    CacheError(String),

    /// 백업 체크섬 불일치
    #[error("Checksum mismatch for {backup_id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        backup_id: String,
        expected: String,
        actual: String,
    },

    /// 백업 쓰기 실패
    #[error("Backup write failure: {0}")]
    BackupWriteFailure(String),

    /// 백업을 찾을 수 없음
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// 파일 입출력 오류
    #[error("I/O error: {0}")]
    Io(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 타임아웃 오류
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// 잘못된 조회 구간
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// 처리할 수 없는 동기화 작업
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DataError {
    /// 다음 제공자로 넘어가 재시도할 수 있는 오류인지 확인합니다.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DataError::Provider(_)
            | DataError::QualityRejected { .. }
            | DataError::Timeout(_)
            | DataError::CacheError(_)
            | DataError::CacheWriteFailure(_) => true,
            DataError::AllSourcesExhausted { .. }
            | DataError::ChecksumMismatch { .. }
            | DataError::BackupWriteFailure(_)
            | DataError::BackupNotFound(_)
            | DataError::Io(_)
            | DataError::SerializationError(_)
            | DataError::InvalidRange(_)
            | DataError::InvalidTask(_)
            | DataError::ConfigError(_) => false,
        }
    }
}

impl From<redis::RedisError> for DataError {
    fn from(err: redis::RedisError) -> Self {
        DataError::CacheError(err.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DataError {
    fn from(err: std::io::Error) -> Self {
        DataError::Io(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for DataError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        DataError::Timeout(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
