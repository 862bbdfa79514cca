//! 백업 스케줄.
//!
//! - 전체 백업: 매일 `full_backup_hour` 시 (UTC)
//! - 증분 백업: `incremental_interval_mins` 분마다
//! - 스냅샷: `snapshot_hours`의 각 시각
//!
//! 각 종류는 가장 최근 예정 시각 이후에 실행된 적이 없으면 실행 대상입니다.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use trader_core::BackupConfig;

use super::backup::BackupType;

/// 종류별 마지막 실행 시각.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastRuns {
    pub full: Option<DateTime<Utc>>,
    pub incremental: Option<DateTime<Utc>>,
    pub snapshot: Option<DateTime<Utc>>,
}

impl LastRuns {
    pub fn record(&mut self, backup_type: BackupType, at: DateTime<Utc>) {
        let slot = match backup_type {
            BackupType::Full => &mut self.full,
            BackupType::Incremental => &mut self.incremental,
            BackupType::Snapshot => &mut self.snapshot,
        };
        *slot = Some(slot.map_or(at, |prev| prev.max(at)));
    }
}

/// 백업 스케줄.
#[derive(Debug, Clone)]
pub struct BackupSchedule {
    full_hour: u32,
    incremental_interval: Duration,
    snapshot_hours: Vec<u32>,
}

impl From<&BackupConfig> for BackupSchedule {
    fn from(config: &BackupConfig) -> Self {
        let mut snapshot_hours: Vec<u32> = config
            .snapshot_hours
            .iter()
            .copied()
            .filter(|h| *h < 24)
            .collect();
        snapshot_hours.sort_unstable();
        snapshot_hours.dedup();

        Self {
            full_hour: config.full_backup_hour.min(23),
            incremental_interval: Duration::minutes(config.incremental_interval_mins.max(1) as i64),
            snapshot_hours,
        }
    }
}

impl BackupSchedule {
    /// `now` 시점에 실행해야 할 백업 종류 (전체 → 스냅샷 → 증분 순).
    pub fn due(&self, now: DateTime<Utc>, last: &LastRuns) -> Vec<BackupType> {
        let mut due = Vec::new();

        if let Some(slot) = latest_slot(now, &[self.full_hour]) {
            if last.full.map_or(true, |t| t < slot) {
                due.push(BackupType::Full);
            }
        }

        if let Some(slot) = latest_slot(now, &self.snapshot_hours) {
            if last.snapshot.map_or(true, |t| t < slot) {
                due.push(BackupType::Snapshot);
            }
        }

        if last
            .incremental
            .map_or(true, |t| now - t >= self.incremental_interval)
        {
            due.push(BackupType::Incremental);
        }

        due
    }
}

/// `now` 이전(포함)의 가장 최근 정각 슬롯. 오늘 슬롯이 아직 안 왔으면 어제 것.
fn latest_slot(now: DateTime<Utc>, hours: &[u32]) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    let at = |date: chrono::NaiveDate, hour: u32| {
        NaiveTime::from_hms_opt(hour, 0, 0).map(|t| Utc.from_utc_datetime(&date.and_time(t)))
    };

    let today_slot = hours
        .iter()
        .filter_map(|h| at(today, *h))
        .filter(|slot| *slot <= now)
        .max();
    if today_slot.is_some() {
        return today_slot;
    }

    let yesterday = today.pred_opt()?;
    hours.iter().filter_map(|h| at(yesterday, *h)).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, min, 0).unwrap()
    }

    fn schedule() -> BackupSchedule {
        BackupSchedule::from(&BackupConfig::default())
    }

    #[test]
    fn test_everything_due_without_history() {
        let due = schedule().due(at(10, 3, 0), &LastRuns::default());
        assert_eq!(
            due,
            vec![BackupType::Full, BackupType::Snapshot, BackupType::Incremental]
        );
    }

    #[test]
    fn test_full_backup_daily_slot() {
        let s = schedule();
        let mut last = LastRuns {
            full: Some(at(10, 2, 1)),
            incremental: Some(at(10, 9, 59)),
            snapshot: Some(at(10, 6, 0)),
        };

        // 같은 날 10시: 전체 백업 끝남
        assert!(s.due(at(10, 10, 0), &last).is_empty());

        // 다음 날 01시: 아직 슬롯 전
        last.incremental = Some(at(11, 0, 59));
        last.snapshot = Some(at(10, 18, 0));
        assert!(!s.due(at(11, 1, 0), &last).contains(&BackupType::Full));

        // 다음 날 02시
        assert!(s.due(at(11, 2, 0), &last).contains(&BackupType::Full));
    }

    #[test]
    fn test_snapshot_hours() {
        let s = schedule();
        let last = LastRuns {
            full: Some(at(10, 2, 0)),
            incremental: Some(at(10, 12, 0)),
            snapshot: Some(at(10, 6, 0)),
        };
        assert!(!s.due(at(10, 11, 59), &last).contains(&BackupType::Snapshot));
        assert!(s.due(at(10, 12, 0), &last).contains(&BackupType::Snapshot));
    }

    #[test]
    fn test_incremental_interval() {
        let s = schedule();
        let last = LastRuns {
            full: Some(at(10, 2, 0)),
            incremental: Some(at(10, 3, 0)),
            snapshot: Some(at(10, 0, 0)),
        };
        assert!(!s.due(at(10, 3, 29), &last).contains(&BackupType::Incremental));
        assert!(s.due(at(10, 3, 30), &last).contains(&BackupType::Incremental));
    }

    #[test]
    fn test_last_runs_record_keeps_latest() {
        let mut last = LastRuns::default();
        last.record(BackupType::Full, at(10, 2, 0));
        last.record(BackupType::Full, at(9, 2, 0));
        assert_eq!(last.full, Some(at(10, 2, 0)));
    }
}
