//! # Trader Core
//!
//! 봉 데이터 수집 시스템 전반에서 공유하는 기본 타입을 제공합니다:
//! - OHLCV 봉과 정렬/중복 제거 유틸리티
//! - 정규/한정 심볼, 자산 분류, 타임프레임
//! - 설정 로드와 검증
//! - 로깅 초기화

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::{init_logging, init_logging_from_env, LogConfig, LogFormat};
pub use types::*;
