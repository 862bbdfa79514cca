//! 심볼 변환기.
//!
//! 정규 심볼을 벤더가 기대하는 한정 심볼로 변환합니다. I/O가 없는 순수 함수입니다.
//!
//! # 규칙 우선순위
//!
//! 1. 이미 `EXCHANGE:CODE` 형식 → 그대로
//! 2. 6자리 숫자 → 60/68/90 접두는 `SSE:`, 00/30/20 접두는 `SZSE:`, 그 외 `SSE:`
//! 3. 5자리 이하 숫자 (선택적 `.HK`) → `HKEX:` + 5자리 0 채움
//! 4. `/` 포함 또는 알려진 견적 자산으로 끝남 → `BINANCE:BASEQUOTE`
//! 5. 알파벳(점 허용) → NASDAQ 목록이면 `NASDAQ:`, 아니면 `NYSE:`
//! 6. 그 외 → 미일치

use std::collections::HashSet;

use trader_core::{AssetClass, CanonicalSymbol, QualifiedSymbol, SymbolStyle};

use crate::{ProviderError, ProviderResult, SymbolProfile};

/// 암호화폐 견적 자산. 긴 접미사를 먼저 검사합니다.
const CRYPTO_QUOTES: [&str; 6] = ["USDT", "USDC", "BUSD", "BTC", "ETH", "BNB"];

/// 기본 NASDAQ 상장 심볼 목록.
const DEFAULT_NASDAQ: [&str; 6] = ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "META"];

/// 심볼 변환기.
#[derive(Debug, Clone)]
pub struct SymbolTranslator {
    nasdaq: HashSet<String>,
}

impl Default for SymbolTranslator {
    fn default() -> Self {
        Self::new(DEFAULT_NASDAQ)
    }
}

impl SymbolTranslator {
    /// NASDAQ 목록을 지정해 생성합니다.
    pub fn new<I, S>(nasdaq: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            nasdaq: nasdaq
                .into_iter()
                .map(|s| s.as_ref().to_uppercase())
                .collect(),
        }
    }

    /// 벤더 프로필에 맞게 변환합니다.
    ///
    /// 규칙에 맞지 않는 심볼은 그대로 통과시키되, 벤더가 변환을 요구하면
    /// `UnrecognizedSymbol`을 반환합니다.
    pub fn translate(
        &self,
        canonical: &CanonicalSymbol,
        profile: SymbolProfile,
    ) -> ProviderResult<QualifiedSymbol> {
        let qualified = match self.qualify(canonical.as_str()) {
            Some(qualified) => qualified,
            None if profile.requires_translation => {
                return Err(ProviderError::UnrecognizedSymbol(canonical.to_string()));
            }
            None => QualifiedSymbol::new(canonical.as_str(), AssetClass::Other),
        };

        Ok(match profile.style {
            SymbolStyle::Prefixed => qualified,
            SymbolStyle::Bare => {
                QualifiedSymbol::new(qualified.code().to_string(), qualified.asset_class())
            }
        })
    }

    /// 자산 분류만 반환합니다. 미일치 심볼은 `Other`.
    pub fn classify(&self, canonical: &CanonicalSymbol) -> AssetClass {
        self.qualify(canonical.as_str())
            .map(|q| q.asset_class())
            .unwrap_or(AssetClass::Other)
    }

    /// `EXCHANGE:CODE` 형식으로 한정합니다. 미일치 시 `None`.
    pub fn qualify(&self, raw: &str) -> Option<QualifiedSymbol> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some((exchange, code)) = raw.split_once(':') {
            if exchange.is_empty() || code.is_empty() {
                return None;
            }
            return Some(QualifiedSymbol::new(raw, exchange_asset_class(exchange)));
        }

        if raw.len() == 6 && raw.bytes().all(|b| b.is_ascii_digit()) {
            let exchange = match &raw[..2] {
                "00" | "30" | "20" => "SZSE",
                _ => "SSE",
            };
            return Some(QualifiedSymbol::new(
                format!("{}:{}", exchange, raw),
                AssetClass::ChinaEquity,
            ));
        }

        if let Some(code) = hong_kong_code(raw) {
            return Some(QualifiedSymbol::new(
                format!("HKEX:{:0>5}", code),
                AssetClass::HongKongEquity,
            ));
        }

        let upper = raw.to_uppercase();

        if let Some(pair) = crypto_pair(&upper) {
            return Some(QualifiedSymbol::new(
                format!("BINANCE:{}", pair),
                AssetClass::Crypto,
            ));
        }

        if upper.bytes().all(|b| b.is_ascii_alphabetic() || b == b'.')
            && upper.bytes().any(|b| b.is_ascii_alphabetic())
        {
            let exchange = if self.nasdaq.contains(&upper) {
                "NASDAQ"
            } else {
                "NYSE"
            };
            return Some(QualifiedSymbol::new(
                format!("{}:{}", exchange, upper),
                AssetClass::UsEquity,
            ));
        }

        None
    }
}

fn exchange_asset_class(exchange: &str) -> AssetClass {
    match exchange.to_uppercase().as_str() {
        "SSE" | "SZSE" => AssetClass::ChinaEquity,
        "HKEX" => AssetClass::HongKongEquity,
        "NASDAQ" | "NYSE" | "AMEX" => AssetClass::UsEquity,
        "BINANCE" | "COINBASE" | "BYBIT" | "OKX" => AssetClass::Crypto,
        _ => AssetClass::Other,
    }
}

fn hong_kong_code(raw: &str) -> Option<&str> {
    let code = raw
        .len()
        .checked_sub(3)
        .filter(|&i| i > 0 && raw.get(i..).is_some_and(|s| s.eq_ignore_ascii_case(".HK")))
        .map_or(raw, |i| &raw[..i]);
    let is_code = (1..=5).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit());
    is_code.then_some(code)
}

fn crypto_pair(upper: &str) -> Option<String> {
    if let Some((base, quote)) = upper.split_once('/') {
        let valid = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric());
        return (valid(base) && valid(quote)).then(|| format!("{}{}", base, quote));
    }
    if !upper.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    CRYPTO_QUOTES
        .iter()
        .find(|quote| upper.len() > quote.len() && upper.ends_with(*quote))
        .map(|_| upper.to_string())
}
