//! 제공자 에러 타입.
//!
//! 어댑터는 전송 계층 실패를 이 분류로만 보고합니다. 재시도와 대체 제공자
//! 선택은 호출 측(데이터 소스 매니저)이 결정합니다.

use thiserror::Error;

/// 업스트림 제공자 에러.
///
/// 병합된 조회의 대기자들이 같은 에러를 받을 수 있도록 `Clone`입니다.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// 네트워크/연결 에러
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// 인증/권한 에러
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 응답 파싱 실패 또는 벤더 에러 응답
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// 심볼 변환 규칙에 맞지 않음
    #[error("Unrecognized symbol: {0}")]
    UnrecognizedSymbol(String),

    /// 연결되지 않은 상태에서 호출
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// 지원되지 않는 작업
    #[error("Not supported: {0}")]
    Unsupported(String),
}

/// 제공자 작업을 위한 Result 타입.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// 실패 카테고리. 제공자 상태 추적에서 임계치 판단에 사용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// 연결/네트워크
    Network,
    /// 인증
    Auth,
    /// 요청 한도
    RateLimit,
    /// 타임아웃
    Timeout,
    /// 응답 형식
    Protocol,
    /// 품질 거부
    Quality,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCategory::Network => "network",
            FailureCategory::Auth => "auth",
            FailureCategory::RateLimit => "rate_limit",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Protocol => "protocol",
            FailureCategory::Quality => "quality",
        };
        f.write_str(s)
    }
}

impl ProviderError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::ConnectionError(_)
                | ProviderError::RateLimited(_)
                | ProviderError::Timeout(_)
                | ProviderError::NotConnected(_)
        )
    }

    /// 권장 재시도 대기 시간(밀리초) 반환.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited(_) => Some(60_000),
            ProviderError::ConnectionError(_) => Some(1_000),
            ProviderError::NotConnected(_) => Some(1_000),
            ProviderError::Timeout(_) => Some(500),
            _ => None,
        }
    }

    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ProviderError::AuthError(_))
    }

    /// 제공자 상태에 반영할 카테고리. 요청 자체의 문제는 `None`.
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            ProviderError::ConnectionError(_) | ProviderError::NotConnected(_) => {
                Some(FailureCategory::Network)
            }
            ProviderError::AuthError(_) => Some(FailureCategory::Auth),
            ProviderError::RateLimited(_) => Some(FailureCategory::RateLimit),
            ProviderError::Timeout(_) => Some(FailureCategory::Timeout),
            ProviderError::MalformedResponse(_) => Some(FailureCategory::Protocol),
            ProviderError::UnrecognizedSymbol(_) | ProviderError::Unsupported(_) => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::ConnectionError(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProviderError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        let message = err.to_string();
        match err {
            WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
                ProviderError::AuthError(message)
            }
            WsError::Protocol(_) | WsError::Utf8 => ProviderError::MalformedResponse(message),
            _ => ProviderError::ConnectionError(message),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Timeout("t".into()).is_retryable());
        assert!(ProviderError::RateLimited("429".into()).is_retryable());
        assert!(!ProviderError::AuthError("bad token".into()).is_retryable());
        assert!(!ProviderError::MalformedResponse("x".into()).is_retryable());
        assert_eq!(
            ProviderError::RateLimited("429".into()).retry_delay_ms(),
            Some(60_000)
        );
    }

    #[test]
    fn test_category() {
        assert_eq!(
            ProviderError::ConnectionError("reset".into()).category(),
            Some(FailureCategory::Network)
        );
        assert_eq!(
            ProviderError::MalformedResponse("x".into()).category(),
            Some(FailureCategory::Protocol)
        );
        assert_eq!(ProviderError::UnrecognizedSymbol("??".into()).category(), None);
    }

    #[test]
    fn test_from_serde_error() {
        let err: ProviderError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
