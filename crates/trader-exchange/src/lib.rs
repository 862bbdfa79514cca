//! 업스트림 봉 데이터 제공자.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `ProviderAdapter` trait: 제공자 공통 인터페이스
//! - `ProviderError`: 전송 계층 실패 분류
//! - `SymbolTranslator`: 정규 심볼 → 벤더 심볼 변환
//! - `ProviderHealth`: 연속 실패/품질 거부 기반 쿨다운
//! - `StreamingProvider`: WebSocket 차트 세션 제공자
//! - `PollingProvider`: HTTP klines 제공자와 요청 간격 제한

pub mod error;
pub mod health;
pub mod polling;
pub mod rate_limit;
pub mod streaming;
pub mod symbol;
pub mod traits;

pub use error::*;
pub use health::{HealthPolicy, HealthRegistry, HealthSnapshot, ProviderHealth};
pub use polling::{PollingConfig, PollingProvider};
pub use rate_limit::RateLimiter;
pub use streaming::{StreamingConfig, StreamingProvider};
pub use symbol::SymbolTranslator;
pub use traits::*;

use std::sync::Arc;

use trader_core::{ProviderConfig, ProviderKind};

/// 설정에서 제공자 어댑터를 생성합니다.
pub fn build_provider(config: &ProviderConfig) -> ProviderResult<Arc<dyn ProviderAdapter>> {
    let provider: Arc<dyn ProviderAdapter> = match config.kind {
        ProviderKind::Streaming => Arc::new(StreamingProvider::new(
            StreamingConfig::from_provider_config(config),
        )),
        ProviderKind::Polling => Arc::new(PollingProvider::new(
            PollingConfig::from_provider_config(config),
        )?),
    };
    Ok(provider)
}
