//! 심볼 및 자산 분류 정의.
//!
//! - `CanonicalSymbol` - 벤더와 무관한 호출자 측 식별자 (예: `"600519"`, `"0700.HK"`)
//! - `QualifiedSymbol` - 특정 벤더용으로 변환된 식별자 (예: `"SSE:600519"`)
//! - `AssetClass` - 거래 캘린더와 시간대를 결정하는 자산 분류

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 벤더와 무관한 정규 심볼.
///
/// 호출자가 생성하며 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalSymbol(String);

impl CanonicalSymbol {
    /// 새 정규 심볼을 생성합니다. 앞뒤 공백은 제거됩니다.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().trim().to_string())
    }

    /// 문자열 참조를 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `EXCHANGE:CODE` 형식으로 이미 한정되어 있는지 확인합니다.
    pub fn is_qualified(&self) -> bool {
        self.0.contains(':')
    }
}

impl fmt::Display for CanonicalSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CanonicalSymbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CanonicalSymbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// 벤더별로 한정된 심볼.
///
/// 단일 조회 작업 안에서만 사용되며 저장되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedSymbol {
    value: String,
    asset_class: AssetClass,
}

impl QualifiedSymbol {
    /// 새 한정 심볼을 생성합니다.
    pub fn new(value: impl Into<String>, asset_class: AssetClass) -> Self {
        Self {
            value: value.into(),
            asset_class,
        }
    }

    /// 문자열 참조를 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// 자산 분류를 반환합니다.
    pub fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    /// 거래소 접두어를 제외한 코드 부분을 반환합니다.
    pub fn code(&self) -> &str {
        self.value
            .split_once(':')
            .map(|(_, code)| code)
            .unwrap_or(&self.value)
    }

    /// 거래소 접두어를 반환합니다.
    pub fn exchange(&self) -> Option<&str> {
        self.value.split_once(':').map(|(exchange, _)| exchange)
    }
}

impl fmt::Display for QualifiedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// 자산 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// 상하이/선전 A주
    ChinaEquity,
    /// 홍콩 주식
    HongKongEquity,
    /// 미국 주식
    UsEquity,
    /// 암호화폐 (24시간 거래)
    Crypto,
    /// 분류 불가
    Other,
}

impl AssetClass {
    /// 거래소 현지 시간대.
    pub fn timezone(&self) -> Tz {
        match self {
            AssetClass::ChinaEquity => chrono_tz::Asia::Shanghai,
            AssetClass::HongKongEquity => chrono_tz::Asia::Hong_Kong,
            AssetClass::UsEquity => chrono_tz::America::New_York,
            AssetClass::Crypto | AssetClass::Other => chrono_tz::UTC,
        }
    }

    /// 평일에만 거래되는지 여부.
    pub fn trades_weekdays_only(&self) -> bool {
        matches!(
            self,
            AssetClass::ChinaEquity | AssetClass::HongKongEquity | AssetClass::UsEquity
        )
    }

    /// 정규 거래 세션 `((시, 분), (시, 분))` 목록, 현지 시각 기준.
    ///
    /// 빈 목록은 24시간 연속 거래를 뜻합니다.
    pub fn sessions(&self) -> &'static [((u32, u32), (u32, u32))] {
        match self {
            AssetClass::ChinaEquity => &[((9, 30), (11, 30)), ((13, 0), (15, 0))],
            AssetClass::HongKongEquity => &[((9, 30), (12, 0)), ((13, 0), (16, 0))],
            AssetClass::UsEquity => &[((9, 30), (16, 0))],
            AssetClass::Crypto | AssetClass::Other => &[],
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::ChinaEquity => write!(f, "china_equity"),
            AssetClass::HongKongEquity => write!(f, "hong_kong_equity"),
            AssetClass::UsEquity => write!(f, "us_equity"),
            AssetClass::Crypto => write!(f, "crypto"),
            AssetClass::Other => write!(f, "other"),
        }
    }
}
