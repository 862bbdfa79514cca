//! 동기화 작업과 우선순위 큐 항목.
//!
//! ```text
//! Pending ──[디스패처]──> Running ──[성공]──> Completed
//!    ↑                      │
//!    └──[재시도 남음, 백오프]──┤
//!                           └──[재시도 소진]──> Failed
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trader_core::Timeframe;

use crate::error::{DataError, Result};

/// 데이터 계층.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTier {
    /// 업스트림 제공자
    Primary,
    Cache,
    Backup,
}

impl fmt::Display for DataTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataTier::Primary => "primary",
            DataTier::Cache => "cache",
            DataTier::Backup => "backup",
        };
        f.write_str(s)
    }
}

/// 작업 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// (출발, 도착) 계층 조합에서 정해지는 작업 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Primary → Cache: 최근 봉을 다시 받아 캐시에 기록
    RefreshCache,
    /// Cache → Backup: 증분 백업
    IncrementalBackup,
    /// Primary → Backup: 갱신 후 전체 백업
    FullBackup,
    /// Backup → Cache: 최신 전체 백업 복원
    RestoreCache,
}

impl TaskKind {
    pub fn from_tiers(source: DataTier, target: DataTier) -> Result<Self> {
        match (source, target) {
            (DataTier::Primary, DataTier::Cache) => Ok(TaskKind::RefreshCache),
            (DataTier::Cache, DataTier::Backup) => Ok(TaskKind::IncrementalBackup),
            (DataTier::Primary, DataTier::Backup) => Ok(TaskKind::FullBackup),
            (DataTier::Backup, DataTier::Cache) => Ok(TaskKind::RestoreCache),
            (s, t) => Err(DataError::InvalidTask(format!(
                "unsupported sync direction {} -> {}",
                s, t
            ))),
        }
    }
}

/// 동기화 작업.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub task_id: String,
    pub source_type: DataTier,
    pub target_type: DataTier,
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    /// 1~10, 작을수록 먼저 실행
    pub priority: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl SyncTask {
    pub const MIN_PRIORITY: u8 = 1;
    pub const MAX_PRIORITY: u8 = 10;

    pub fn new(
        source_type: DataTier,
        target_type: DataTier,
        symbols: Vec<String>,
        timeframes: Vec<Timeframe>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: new_task_id(now),
            source_type,
            target_type,
            symbols,
            timeframes,
            priority: 5,
            retry_count: 0,
            max_retries: 3,
            state: TaskState::Pending,
            created_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(Self::MIN_PRIORITY, Self::MAX_PRIORITY);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn kind(&self) -> Result<TaskKind> {
        TaskKind::from_tiers(self.source_type, self.target_type)
    }

    pub fn mark_running(&mut self) {
        self.state = TaskState::Running;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.state = TaskState::Completed;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// 실패를 기록합니다. 재시도가 남았으면 `Pending`으로 되돌리고 대기 시간을 반환합니다.
    pub fn mark_failed(&mut self, error: &str, base_delay: Duration) -> Option<Duration> {
        self.last_error = Some(error.to_string());
        self.updated_at = Utc::now();

        if self.retry_count < self.max_retries {
            let delay = base_delay.saturating_mul(2u32.saturating_pow(self.retry_count));
            self.retry_count += 1;
            self.state = TaskState::Pending;
            Some(delay)
        } else {
            self.state = TaskState::Failed;
            None
        }
    }

    /// 재시도 없이 실패 처리합니다.
    pub fn mark_rejected(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
        self.state = TaskState::Failed;
        self.updated_at = Utc::now();
    }
}

fn new_task_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("sync_{}_{}", now.timestamp(), &suffix[..8])
}

/// 큐 항목. `BinaryHeap`에서 우선순위 값이 작은 것, 같으면 먼저 들어온 것이 먼저 나옵니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub priority: u8,
    pub seq: u64,
    pub task_id: String,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_task_kind_from_tiers() {
        assert_eq!(
            TaskKind::from_tiers(DataTier::Primary, DataTier::Cache).unwrap(),
            TaskKind::RefreshCache
        );
        assert_eq!(
            TaskKind::from_tiers(DataTier::Backup, DataTier::Cache).unwrap(),
            TaskKind::RestoreCache
        );
        assert!(matches!(
            TaskKind::from_tiers(DataTier::Cache, DataTier::Primary),
            Err(DataError::InvalidTask(_))
        ));
    }

    #[test]
    fn test_retry_backoff_then_failed() {
        let mut task = SyncTask::new(DataTier::Primary, DataTier::Cache, vec![], vec![])
            .with_max_retries(2);
        let base = Duration::from_secs(1);

        assert_eq!(task.mark_failed("boom", base), Some(Duration::from_secs(1)));
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.mark_failed("boom", base), Some(Duration::from_secs(2)));
        assert_eq!(task.mark_failed("boom", base), None);
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.retry_count, 2);
        assert_eq!(task.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_priority_clamped() {
        let task = SyncTask::new(DataTier::Primary, DataTier::Cache, vec![], vec![]);
        assert_eq!(task.clone().with_priority(0).priority, 1);
        assert_eq!(task.with_priority(42).priority, 10);
    }

    #[test]
    fn test_queue_order_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        let item = |priority, seq: u64| QueuedTask {
            priority,
            seq,
            task_id: format!("t{}", seq),
        };
        heap.push(item(5, 0));
        heap.push(item(1, 1));
        heap.push(item(5, 2));
        heap.push(item(1, 3));

        let order: Vec<String> = std::iter::from_fn(|| heap.pop().map(|q| q.task_id)).collect();
        assert_eq!(order, vec!["t1", "t3", "t0", "t2"]);
    }

    #[test]
    fn test_task_id_format() {
        let task = SyncTask::new(DataTier::Cache, DataTier::Backup, vec![], vec![]);
        assert!(task.task_id.starts_with("sync_"));
        assert_eq!(task.task_id.split('_').count(), 3);
    }
}
