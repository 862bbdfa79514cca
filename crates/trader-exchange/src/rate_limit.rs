//! 요청 간격 제한.
//!
//! polling 어댑터가 요청 사이에 최소 간격을 두도록 합니다. 동시에 호출되면
//! 다음 슬롯을 예약한 뒤 잠금을 풀고 대기하므로 호출 순서대로 간격이 벌어집니다.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// 최소 간격 기반 요청 제한기.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// 최소 간격을 지정해 생성합니다. 0이면 제한하지 않습니다.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// 밀리초 단위로 생성합니다.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// 최소 간격.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 다음 요청 슬롯까지 대기합니다.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let wait_until = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next_slot = Some(slot + self.min_interval);
            slot
        };

        if wait_until > Instant::now() {
            tracing::trace!(
                wait_ms = (wait_until - Instant::now()).as_millis() as u64,
                "Rate limiter delaying request"
            );
            tokio::time::sleep_until(wait_until).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced() {
        let limiter = RateLimiter::from_millis(100);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // 첫 요청은 즉시, 이후 100ms 간격
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = std::time::Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
