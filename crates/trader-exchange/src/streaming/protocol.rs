//! 차트 스트리밍 프로토콜 인코딩/디코딩.
//!
//! 텍스트 프레임 하나에 `~m~{len}~m~{payload}` 형식의 패킷이 여러 개 들어올 수
//! 있습니다. payload가 `~h~N`이면 하트비트이며 그대로 되돌려 보내야 합니다.
//! 그 외 payload는 `{"m": method, "p": [params...]}` JSON입니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use trader_core::Bar;

use crate::{ProviderError, ProviderResult};

const FRAME_MARK: &str = "~m~";
const HEARTBEAT_MARK: &str = "~h~";

/// 익명 접속용 인증 토큰.
pub const ANONYMOUS_TOKEN: &str = "unauthorized_user_token";

/// 디코딩된 패킷.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// 하트비트 (`~h~N`의 payload 전체)
    Heartbeat(String),
    /// 메서드 호출
    Message { method: String, params: Vec<Value> },
    /// 세션 정보 등 그 외 JSON
    Other(Value),
}

impl Packet {
    /// 첫 번째 파라미터가 문자열이면 세션 ID로 반환합니다.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Packet::Message { params, .. } => params.first().and_then(Value::as_str),
            _ => None,
        }
    }
}

/// payload 하나를 프레임으로 감쌉니다.
pub fn encode_frame(payload: &str) -> String {
    format!("{}{}{}{}", FRAME_MARK, payload.len(), FRAME_MARK, payload)
}

/// 메서드 호출 메시지를 프레임으로 인코딩합니다.
pub fn encode_message(method: &str, params: Vec<Value>) -> String {
    encode_frame(&json!({ "m": method, "p": params }).to_string())
}

/// 텍스트 프레임을 패킷 목록으로 디코딩합니다. 해석할 수 없는 payload는 건너뜁니다.
pub fn decode_frames(text: &str) -> Vec<Packet> {
    split_payloads(text)
        .into_iter()
        .filter_map(|payload| {
            if payload.starts_with(HEARTBEAT_MARK) {
                return Some(Packet::Heartbeat(payload.to_string()));
            }
            let value: Value = serde_json::from_str(payload).ok()?;
            match (value.get("m").and_then(Value::as_str), value.get("p")) {
                (Some(method), Some(Value::Array(params))) => Some(Packet::Message {
                    method: method.to_string(),
                    params: params.clone(),
                }),
                _ => Some(Packet::Other(value)),
            }
        })
        .collect()
}

/// `~m~{digits}~m~` 헤더를 기준으로 payload를 나눕니다.
fn split_payloads(text: &str) -> Vec<&str> {
    let mut payloads = Vec::new();
    let mut rest = text;

    while let Some(pos) = rest.find(FRAME_MARK) {
        let after = &rest[pos + FRAME_MARK.len()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || !after[digits..].starts_with(FRAME_MARK) {
            break;
        }
        let body = &after[digits + FRAME_MARK.len()..];
        let declared: usize = after[..digits].parse().unwrap_or(0);

        let end = if body.is_char_boundary(declared.min(body.len()))
            && declared <= body.len()
            && (declared == body.len() || body[declared..].starts_with(FRAME_MARK))
        {
            declared
        } else {
            body.find(FRAME_MARK).unwrap_or(body.len())
        };

        payloads.push(&body[..end]);
        rest = &body[end..];
    }

    payloads
}

/// `timescale_update` 파라미터에서 봉을 추출합니다.
///
/// 봉은 `params[1]["$prices"]["s"]`에 `{"i": index, "v": [ts, o, h, l, c, vol]}`
/// 형태로 들어 있으며 타임스탬프는 초 단위입니다. 거래량이 없으면 0입니다.
pub fn parse_timescale_update(params: &[Value]) -> ProviderResult<Vec<Bar>> {
    let Some(series) = params
        .get(1)
        .and_then(|p| p.get("$prices"))
        .and_then(|p| p.get("s"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    series
        .iter()
        .map(|entry| {
            let values = entry
                .get("v")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("bar entry without 'v' array"))?;
            parse_bar(values)
        })
        .collect()
}

fn parse_bar(values: &[Value]) -> ProviderResult<Bar> {
    if values.len() < 5 {
        return Err(malformed(format!(
            "bar entry has {} values, expected at least 5",
            values.len()
        )));
    }

    let secs = values[0]
        .as_f64()
        .ok_or_else(|| malformed("bar timestamp is not a number"))?;
    let timestamp = DateTime::<Utc>::from_timestamp(secs.trunc() as i64, 0)
        .ok_or_else(|| malformed(format!("bar timestamp out of range: {}", secs)))?;

    let volume = match values.get(5) {
        Some(v) if !v.is_null() => to_decimal(v)?,
        _ => Decimal::ZERO,
    };

    Ok(Bar::new(
        timestamp,
        to_decimal(&values[1])?,
        to_decimal(&values[2])?,
        to_decimal(&values[3])?,
        to_decimal(&values[4])?,
        volume,
    ))
}

fn to_decimal(value: &Value) -> ProviderResult<Decimal> {
    let Value::Number(n) = value else {
        return Err(malformed(format!("expected number, got {}", value)));
    };
    let text = n.to_string();
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| malformed(format!("invalid number {}: {}", text, e)))
}

/// 에러 패킷의 설명 문자열을 모읍니다.
pub fn describe_error(params: &[Value]) -> String {
    params
        .iter()
        .skip(1)
        .map(|p| match p {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn malformed(message: impl Into<String>) -> ProviderError {
    ProviderError::MalformedResponse(message.into())
}
