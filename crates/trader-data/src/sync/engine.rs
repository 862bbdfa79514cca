//! 동기화 엔진.
//!
//! - 우선순위 큐(`BinaryHeap`)에서 작업을 꺼내 별도 풀(`Semaphore`)에서 실행
//! - 실패 시 `base × 2^retry_count` 백오프 후 재투입, 재시도 소진 시 `Failed`
//! - 주기 동기화: 핫 심볼 갱신 후 증분 백업 작업 제출
//! - 백업 스케줄 루프: 전체/증분/스냅샷, 전체 백업 후 보존 정책 적용

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use trader_core::{BackupConfig, SyncConfig, Timeframe};

use super::backup::{BackupManager, BackupType};
use super::schedule::{BackupSchedule, LastRuns};
use super::task::{DataTier, QueuedTask, SyncTask, TaskKind, TaskState};
use crate::error::{DataError, Result};
use crate::manager::DataSourceManager;

const SCHEDULE_TICK: Duration = Duration::from_secs(60);

/// 엔진 상태 요약.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub queue_length: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub total_tasks: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub backup_count: usize,
    pub total_backup_bytes: u64,
}

struct EngineInner {
    config: SyncConfig,
    schedule: BackupSchedule,
    schedule_enabled: bool,
    manager: DataSourceManager,
    backups: Arc<BackupManager>,
    queue: Mutex<BinaryHeap<QueuedTask>>,
    tasks: RwLock<HashMap<String, SyncTask>>,
    notify: Notify,
    pool: Arc<Semaphore>,
    seq: AtomicU64,
    running: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

/// 동기화/백업 엔진.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        backup_config: &BackupConfig,
        manager: DataSourceManager,
        backups: Arc<BackupManager>,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        Self {
            inner: Arc::new(EngineInner {
                schedule: BackupSchedule::from(backup_config),
                schedule_enabled: backup_config.schedule_enabled,
                config,
                manager,
                backups,
                queue: Mutex::new(BinaryHeap::new()),
                tasks: RwLock::new(HashMap::new()),
                notify: Notify::new(),
                pool,
                seq: AtomicU64::new(0),
                running: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                last_sync: Mutex::new(None),
            }),
        }
    }

    pub fn backups(&self) -> &Arc<BackupManager> {
        &self.inner.backups
    }

    /// 작업을 큐에 넣고 ID를 반환합니다.
    pub fn submit(&self, mut task: SyncTask) -> String {
        task.state = TaskState::Pending;
        let task_id = task.task_id.clone();
        debug!(
            task_id = %task_id,
            source = %task.source_type,
            target = %task.target_type,
            priority = task.priority,
            "Sync task submitted"
        );
        self.inner.enqueue(task);
        task_id
    }

    /// 기본 재시도 설정으로 작업을 만들어 제출합니다.
    pub fn submit_new(
        &self,
        source: DataTier,
        target: DataTier,
        symbols: Vec<String>,
        timeframes: Vec<Timeframe>,
        priority: u8,
    ) -> String {
        let task = SyncTask::new(source, target, symbols, timeframes)
            .with_priority(priority)
            .with_max_retries(self.inner.config.max_retries);
        self.submit(task)
    }

    pub fn task(&self, task_id: &str) -> Option<SyncTask> {
        self.inner
            .tasks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(task_id)
            .cloned()
    }

    pub async fn system_status(&self) -> SystemStatus {
        let inner = &self.inner;
        let (backup_count, total_backup_bytes) = inner.backups.totals().await;
        SystemStatus {
            queue_length: inner.queue.lock().unwrap_or_else(|e| e.into_inner()).len(),
            running: inner.running.load(Ordering::Relaxed),
            completed: inner.completed.load(Ordering::Relaxed),
            failed: inner.failed.load(Ordering::Relaxed),
            total_tasks: inner.tasks.read().unwrap_or_else(|e| e.into_inner()).len(),
            last_sync: *inner.last_sync.lock().unwrap_or_else(|e| e.into_inner()),
            backup_count,
            total_backup_bytes,
        }
    }

    /// 디스패처, 주기 동기화, 백업 스케줄 루프를 시작합니다.
    pub fn start(&self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = vec![tokio::spawn(
            Arc::clone(&self.inner).dispatch_loop(token.clone()),
        )];

        if self.inner.config.enabled {
            handles.push(tokio::spawn(self.clone().periodic_sync_loop(token.clone())));
        }
        if self.inner.schedule_enabled {
            handles.push(tokio::spawn(Arc::clone(&self.inner).schedule_loop(token)));
        }

        info!(
            max_concurrent_tasks = self.inner.config.max_concurrent_tasks,
            periodic_sync = self.inner.config.enabled,
            backup_schedule = self.inner.schedule_enabled,
            "Sync engine started"
        );
        handles
    }

    /// 핫 심볼 갱신과 증분 백업 작업을 제출합니다.
    pub fn submit_periodic(&self) -> (String, String) {
        let config = &self.inner.config;
        let refresh = self.submit_new(
            DataTier::Primary,
            DataTier::Cache,
            config.hot_symbols.clone(),
            config.hot_timeframes.clone(),
            3,
        );
        let backup = self.submit_new(
            DataTier::Cache,
            DataTier::Backup,
            config.hot_symbols.clone(),
            config.hot_timeframes.clone(),
            5,
        );
        (refresh, backup)
    }

    async fn periodic_sync_loop(self, token: CancellationToken) {
        let period = Duration::from_secs(self.inner.config.sync_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let (refresh, backup) = self.submit_periodic();
                    debug!(refresh = %refresh, backup = %backup, "Periodic sync submitted");
                }
            }
        }
        debug!("Periodic sync loop stopped");
    }
}

impl EngineInner {
    fn enqueue(&self, task: SyncTask) {
        let queued = QueuedTask {
            priority: task.priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            task_id: task.task_id.clone(),
        };
        self.tasks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task.task_id.clone(), task);
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(queued);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<QueuedTask> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop()
    }

    fn update<R>(&self, task_id: &str, f: impl FnOnce(&mut SyncTask) -> R) -> Option<R> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let result = tasks.get_mut(task_id).map(f);
        self.evict_finished(&mut tasks);
        result
    }

    /// 보관 한도를 넘는 종료 태스크를 오래된 순으로 제거합니다.
    fn evict_finished(&self, tasks: &mut HashMap<String, SyncTask>) {
        let mut finished: Vec<(DateTime<Utc>, String)> = tasks
            .values()
            .filter(|t| t.state.is_terminal())
            .map(|t| (t.updated_at, t.task_id.clone()))
            .collect();
        let limit = self.config.task_retention.max(1);
        if finished.len() <= limit {
            return;
        }

        finished.sort();
        let excess = finished.len() - limit;
        for (_, task_id) in finished.into_iter().take(excess) {
            tasks.remove(&task_id);
        }
        debug!(evicted = excess, retained = limit, "Finished sync tasks evicted");
    }

    async fn dispatch_loop(self: Arc<Self>, token: CancellationToken) {
        loop {
            let permit = tokio::select! {
                _ = token.cancelled() => break,
                permit = Arc::clone(&self.pool).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = loop {
                if let Some(next) = self.pop() {
                    break Some(next);
                }
                tokio::select! {
                    _ = token.cancelled() => break None,
                    _ = self.notify.notified() => {}
                }
            };
            let Some(next) = next else { break };

            let inner = Arc::clone(&self);
            let task_token = token.clone();
            tokio::spawn(async move {
                inner.execute(&next.task_id, task_token).await;
                drop(permit);
            });
        }
        debug!("Sync dispatcher stopped");
    }

    #[instrument(skip(self, token))]
    async fn execute(self: &Arc<Self>, task_id: &str, token: CancellationToken) {
        let Some(task) = self.update(task_id, |t| {
            t.mark_running();
            t.clone()
        }) else {
            warn!("Dequeued unknown task");
            return;
        };

        self.running.fetch_add(1, Ordering::Relaxed);
        let outcome = match task.kind() {
            Ok(kind) => self.run_kind(kind, &task).await,
            Err(e) => Err(e),
        };
        self.running.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                self.update(task_id, |t| t.mark_completed());
                self.completed.fetch_add(1, Ordering::Relaxed);
                info!(kind = ?task.kind().ok(), "Sync task completed");
            }
            Err(e @ DataError::InvalidTask(_)) => {
                self.update(task_id, |t| t.mark_rejected(&e.to_string()));
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Sync task rejected");
            }
            Err(e) => {
                let base = Duration::from_millis(self.config.retry_base_delay_ms);
                let retry = self
                    .update(task_id, |t| t.mark_failed(&e.to_string(), base).map(|d| (d, t.clone())))
                    .flatten();

                match retry {
                    Some((delay, retried)) => {
                        warn!(
                            error = %e,
                            retry = retried.retry_count,
                            delay_ms = delay.as_millis() as u64,
                            "Sync task failed, retrying"
                        );
                        let inner = Arc::clone(self);
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = token.cancelled() => {}
                                _ = tokio::time::sleep(delay) => inner.enqueue(retried),
                            }
                        });
                    }
                    None => {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        error!(error = %e, "Sync task failed after retries");
                    }
                }
            }
        }
    }

    async fn run_kind(&self, kind: TaskKind, task: &SyncTask) -> Result<()> {
        match kind {
            TaskKind::RefreshCache => self.refresh(&task.symbols, &task.timeframes).await,
            TaskKind::IncrementalBackup => self
                .backups
                .create_backup(BackupType::Incremental, &task.symbols, &task.timeframes)
                .await
                .map(|_| ()),
            TaskKind::FullBackup => {
                self.refresh(&task.symbols, &task.timeframes).await?;
                self.backups
                    .create_backup(BackupType::Full, &task.symbols, &task.timeframes)
                    .await
                    .map(|_| ())
            }
            TaskKind::RestoreCache => {
                let latest = self
                    .backups
                    .latest(BackupType::Full)
                    .await
                    .ok_or_else(|| DataError::BackupNotFound("no full backup".to_string()))?;
                self.backups.restore(&latest.backup_id).await.map(|_| ())
            }
        }
    }

    /// 심볼×타임프레임마다 최근 `batch_size`개 봉을 캐시를 거치지 않고 다시 받습니다.
    async fn refresh(&self, symbols: &[String], timeframes: &[Timeframe]) -> Result<()> {
        let now = Utc::now();
        let mut first_error = None;

        for symbol in symbols {
            for &timeframe in timeframes {
                let query = self
                    .manager
                    .recent_query(symbol.as_str(), timeframe, self.config.batch_size, now)
                    .with_cache(false);
                match self.manager.get_bars_with(query).await {
                    Ok(response) => debug!(
                        symbol = %symbol,
                        timeframe = %timeframe,
                        bars = response.bars.len(),
                        cache_status = %response.cache_status,
                        "Series refreshed"
                    ),
                    Err(e) => {
                        warn!(symbol = %symbol, timeframe = %timeframe, error = %e, "Series refresh failed");
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        *self.last_sync.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    async fn schedule_loop(self: Arc<Self>, token: CancellationToken) {
        let mut last = LastRuns::default();
        for backup in self.backups.list_backups().await {
            last.record(backup.backup_type, backup.created_at);
        }

        let mut ticker = tokio::time::interval(SCHEDULE_TICK);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let now = Utc::now();
                    for backup_type in self.schedule.due(now, &last) {
                        match self.backups.create_backup(backup_type, &[], &[]).await {
                            Ok(manifest) => {
                                last.record(backup_type, now);
                                debug!(backup_id = %manifest.backup_id, "Scheduled backup done");
                                if backup_type == BackupType::Full {
                                    if let Err(e) = self.backups.prune(now).await {
                                        warn!(error = %e, "Retention pass failed");
                                    }
                                }
                            }
                            Err(e) => error!(backup_type = %backup_type, error = %e, "Scheduled backup failed"),
                        }
                    }
                }
            }
        }
        debug!("Backup schedule loop stopped");
    }
}
