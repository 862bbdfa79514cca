//! 백업 관리자.
//!
//! 백업 디렉터리 구성:
//!
//! ```text
//! {dir}/
//! ├── backup_index.json                    # 버전, 레코드, 증분 마커
//! ├── backup_full_20250101_020000.json      # 아카이브
//! └── backup_full_20250101_020000.manifest.json
//! ```
//!
//! 체크섬은 아카이브 바이트의 SHA-256 hex이며 복원 전에 다시 계산합니다.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use trader_core::{normalize_bars, BackupConfig, Bar, Timeframe};

use crate::cache::{CacheEntry, CacheKey, CacheWriteStatus, TieredCache};
use crate::error::{DataError, Result};

const INDEX_FILE: &str = "backup_index.json";
const INDEX_VERSION: u32 = 1;
const WRITE_RETRY_BASE: Duration = Duration::from_millis(200);

/// 백업 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    /// 추적 중인 모든 시리즈
    Full,
    /// 마지막 마커 이후의 봉만
    Incremental,
    /// 모든 L2 항목의 시점 복사
    Snapshot,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupType::Full => "full",
            BackupType::Incremental => "incremental",
            BackupType::Snapshot => "snapshot",
        };
        f.write_str(s)
    }
}

impl FromStr for BackupType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "full" => Ok(BackupType::Full),
            "incremental" => Ok(BackupType::Incremental),
            "snapshot" => Ok(BackupType::Snapshot),
            other => Err(DataError::InvalidTask(format!("unknown backup type: {}", other))),
        }
    }
}

/// 백업 매니페스트. 기록 후 변경하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backup_id: String,
    pub backup_type: BackupType,
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub file_path: String,
    pub size_bytes: u64,
    pub bar_count: usize,
    pub series_count: usize,
    pub data_start: Option<DateTime<Utc>>,
    pub data_end: Option<DateTime<Utc>>,
}

/// 아카이브 안의 캐시 항목 하나.
///
/// 복원은 `key` 그대로 다시 쓰므로 구간별 항목이 합쳐지지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSeries {
    pub key: CacheKey,
    pub quality_score: f64,
    pub source: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupArchive {
    backup_id: String,
    backup_type: BackupType,
    created_at: DateTime<Utc>,
    series: Vec<BackupSeries>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupIndex {
    version: u32,
    records: Vec<BackupManifest>,
    /// `{symbol}|{timeframe}` → 마지막으로 백업된 봉 시각
    markers: BTreeMap<String, DateTime<Utc>>,
}

impl Default for BackupIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            records: Vec::new(),
            markers: BTreeMap::new(),
        }
    }
}

/// 복원 결과.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub backup_id: String,
    pub series_restored: usize,
    pub series_skipped: usize,
    pub bars_restored: usize,
}

/// 백업 생성/복원/검증/정리.
pub struct BackupManager {
    dir: PathBuf,
    config: BackupConfig,
    cache: Arc<TieredCache>,
    /// 백업 작업 직렬화 겸 인덱스 보관
    index: Mutex<BackupIndex>,
}

impl BackupManager {
    /// 디렉터리를 열고 인덱스를 읽습니다. 손상된 인덱스는 비우고 시작합니다.
    pub async fn open(config: BackupConfig, cache: Arc<TieredCache>) -> Result<Self> {
        let dir = PathBuf::from(&config.dir);
        tokio::fs::create_dir_all(&dir).await?;

        let index = match tokio::fs::read(dir.join(INDEX_FILE)).await {
            Ok(bytes) => match serde_json::from_slice::<BackupIndex>(&bytes) {
                Ok(index) => index,
                Err(e) => {
                    error!(error = %e, "Backup index unreadable, starting empty");
                    BackupIndex::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BackupIndex::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            dir = %dir.display(),
            records = index.records.len(),
            "Backup manager initialized"
        );

        Ok(Self {
            dir,
            config,
            cache,
            index: Mutex::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 백업을 생성하고 매니페스트를 반환합니다.
    ///
    /// 빈 `symbols`/`timeframes`는 전체를 뜻합니다. 스냅샷은 필터를 무시합니다.
    #[instrument(skip(self, symbols, timeframes), fields(backup_type = %backup_type))]
    pub async fn create_backup(
        &self,
        backup_type: BackupType,
        symbols: &[String],
        timeframes: &[Timeframe],
    ) -> Result<BackupManifest> {
        let mut index = self.index.lock().await;
        let now = Utc::now();
        let backup_id = self.allocate_id(&index, backup_type, now).await;

        let entries = self.cache.entries().await?;
        let series = match backup_type {
            BackupType::Full => collect_series(&entries, symbols, timeframes, None),
            BackupType::Incremental => {
                collect_series(&entries, symbols, timeframes, Some(&index.markers))
            }
            BackupType::Snapshot => entries.iter().map(series_from_entry).collect(),
        };

        let archive = BackupArchive {
            backup_id: backup_id.clone(),
            backup_type,
            created_at: now,
            series,
        };
        let bytes = serde_json::to_vec(&archive)?;
        let archive_path = self.archive_path(&backup_id);
        self.write_with_retry(&archive_path, &bytes).await?;

        let manifest = build_manifest(&archive, &archive_path, &bytes);
        let manifest_path = self.manifest_path(&backup_id);
        self.write_with_retry(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)
            .await?;

        if backup_type != BackupType::Snapshot {
            for s in &archive.series {
                if let Some(last) = s.bars.last() {
                    let marker = index
                        .markers
                        .entry(marker_key(&s.key.symbol, s.key.timeframe))
                        .or_insert(last.timestamp);
                    *marker = (*marker).max(last.timestamp);
                }
            }
        }
        index.records.push(manifest.clone());
        self.save_index(&index).await?;

        info!(
            backup_id = %manifest.backup_id,
            series = manifest.series_count,
            bars = manifest.bar_count,
            size_bytes = manifest.size_bytes,
            "Backup created"
        );
        Ok(manifest)
    }

    /// 체크섬을 확인한 뒤 캐시로 복원합니다.
    #[instrument(skip(self))]
    pub async fn restore(&self, backup_id: &str) -> Result<RestoreReport> {
        let archive = self.load_verified(backup_id).await?;
        let now = Utc::now();

        let mut report = RestoreReport {
            backup_id: backup_id.to_string(),
            series_restored: 0,
            series_skipped: 0,
            bars_restored: 0,
        };

        for series in archive.series {
            let key = series.key;
            let label = key.to_string();
            let bar_count = series.bars.len();
            let entry = CacheEntry::new(
                key,
                series.bars,
                series.quality_score,
                series.source,
                (series.range_start, series.range_end),
                now,
                self.config.restore_ttl_secs,
            );

            match self.cache.put(entry).await {
                CacheWriteStatus::Written => {
                    report.series_restored += 1;
                    report.bars_restored += bar_count;
                }
                status => {
                    warn!(key = %label, ?status, "Series not restored");
                    report.series_skipped += 1;
                }
            }
        }

        info!(
            backup_id,
            series = report.series_restored,
            skipped = report.series_skipped,
            bars = report.bars_restored,
            "Backup restored"
        );
        Ok(report)
    }

    /// 아카이브 체크섬을 확인합니다.
    pub async fn verify(&self, backup_id: &str) -> Result<()> {
        self.load_verified(backup_id).await.map(|_| ())
    }

    /// 최신순 백업 목록.
    pub async fn list_backups(&self) -> Vec<BackupManifest> {
        let index = self.index.lock().await;
        let mut records = index.records.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// 종류별 가장 최근 백업.
    pub async fn latest(&self, backup_type: BackupType) -> Option<BackupManifest> {
        let index = self.index.lock().await;
        index
            .records
            .iter()
            .filter(|r| r.backup_type == backup_type)
            .max_by_key(|r| r.created_at)
            .cloned()
    }

    /// 백업 개수와 총 크기.
    pub async fn totals(&self) -> (usize, u64) {
        let index = self.index.lock().await;
        let bytes = index.records.iter().map(|r| r.size_bytes).sum();
        (index.records.len(), bytes)
    }

    /// 보존 정책에 따라 오래된 백업을 삭제하고 삭제된 ID를 반환합니다.
    ///
    /// 가장 최근 `keep_min_recent`개는 나이/개수와 무관하게 유지합니다.
    #[instrument(skip(self))]
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut index = self.index.lock().await;
        let mut records = index.records.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let max_age = chrono::Duration::days(self.config.max_age_days.max(0));
        let keep_min = self.config.keep_min_recent;
        let max_files = self.config.max_backup_files.max(keep_min);

        let doomed: Vec<String> = records
            .iter()
            .enumerate()
            .filter(|(i, r)| *i >= keep_min && (*i >= max_files || now - r.created_at > max_age))
            .map(|(_, r)| r.backup_id.clone())
            .collect();

        if doomed.is_empty() {
            return Ok(doomed);
        }

        for id in &doomed {
            for path in [self.archive_path(id), self.manifest_path(id)] {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %e, "Failed to delete backup file");
                    }
                }
            }
        }

        let doomed_set: HashSet<&String> = doomed.iter().collect();
        index.records.retain(|r| !doomed_set.contains(&r.backup_id));
        self.save_index(&index).await?;

        info!(removed = doomed.len(), remaining = index.records.len(), "Old backups pruned");
        Ok(doomed)
    }

    // =========================================================================
    // 내부
    // =========================================================================

    fn archive_path(&self, backup_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", backup_id))
    }

    fn manifest_path(&self, backup_id: &str) -> PathBuf {
        self.dir.join(format!("{}.manifest.json", backup_id))
    }

    async fn allocate_id(
        &self,
        index: &BackupIndex,
        backup_type: BackupType,
        now: DateTime<Utc>,
    ) -> String {
        let base = format!("backup_{}_{}", backup_type, now.format("%Y%m%d_%H%M%S"));
        let mut candidate = base.clone();
        let mut suffix = 0u32;
        loop {
            let recorded = index.records.iter().any(|r| r.backup_id == candidate);
            // 확인 실패는 사용 중으로 간주
            let on_disk = tokio::fs::try_exists(self.archive_path(&candidate))
                .await
                .unwrap_or(true);
            if !recorded && !on_disk {
                return candidate;
            }
            suffix += 1;
            candidate = format!("{}_{}", base, suffix);
        }
    }

    async fn load_verified(&self, backup_id: &str) -> Result<BackupArchive> {
        let manifest = {
            let index = self.index.lock().await;
            index
                .records
                .iter()
                .find(|r| r.backup_id == backup_id)
                .cloned()
                .ok_or_else(|| DataError::BackupNotFound(backup_id.to_string()))?
        };

        let bytes = match tokio::fs::read(&manifest.file_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataError::BackupNotFound(format!(
                    "{} (archive missing)",
                    backup_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let actual = checksum(&bytes);
        if actual != manifest.checksum {
            let err = DataError::ChecksumMismatch {
                backup_id: backup_id.to_string(),
                expected: manifest.checksum.clone(),
                actual,
            };
            error!(error = %err, "Backup integrity check failed");
            return Err(err);
        }

        debug!(backup_id, "Backup checksum verified");
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_with_retry(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let attempts = self.config.write_retries.max(1);
        let timeout = Duration::from_secs(self.config.write_timeout_secs.max(1));
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match tokio::time::timeout(timeout, write_atomic(path, bytes)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("write timed out after {:?}", timeout),
            }

            warn!(
                path = %path.display(),
                attempt = attempt + 1,
                error = %last_error,
                "Backup write failed"
            );
            if attempt + 1 < attempts {
                tokio::time::sleep(WRITE_RETRY_BASE * 2u32.saturating_pow(attempt)).await;
            }
        }

        Err(DataError::BackupWriteFailure(format!(
            "{}: {}",
            path.display(),
            last_error
        )))
    }

    async fn save_index(&self, index: &BackupIndex) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        self.write_with_retry(&self.dir.join(INDEX_FILE), &bytes).await
    }
}

/// 아카이브 바이트의 SHA-256 hex.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn marker_key(symbol: &str, timeframe: Timeframe) -> String {
    format!("{}|{}", symbol, timeframe)
}

fn series_from_entry(entry: &CacheEntry) -> BackupSeries {
    BackupSeries {
        key: entry.key.clone(),
        quality_score: entry.quality_score,
        source: entry.source.clone(),
        range_start: entry.range_start,
        range_end: entry.range_end,
        bars: entry.bars.clone(),
    }
}

/// 필터에 맞는 L2 항목을 항목 단위로 모읍니다.
///
/// `markers`가 있으면 (심볼, 타임프레임) 마커 이후의 봉만 남기고 빈 항목은 버립니다.
fn collect_series(
    entries: &[CacheEntry],
    symbols: &[String],
    timeframes: &[Timeframe],
    markers: Option<&BTreeMap<String, DateTime<Utc>>>,
) -> Vec<BackupSeries> {
    let mut collected: Vec<BackupSeries> = entries
        .iter()
        .filter(|e| symbols.is_empty() || symbols.iter().any(|s| *s == e.key.symbol))
        .filter(|e| timeframes.is_empty() || timeframes.contains(&e.key.timeframe))
        .filter_map(|entry| {
            let mut series = series_from_entry(entry);
            series.bars = normalize_bars(std::mem::take(&mut series.bars));
            let marker = markers.and_then(|m| m.get(&marker_key(&entry.key.symbol, entry.key.timeframe)));
            if let Some(marker) = marker {
                series.bars.retain(|b| b.timestamp > *marker);
                if let Some(first) = series.bars.first() {
                    series.range_start = series.range_start.max(first.timestamp);
                }
            }
            (!series.bars.is_empty()).then_some(series)
        })
        .collect();

    collected.sort_by(|a, b| {
        (&a.key.symbol, a.key.timeframe, a.key.start_bucket)
            .cmp(&(&b.key.symbol, b.key.timeframe, b.key.start_bucket))
    });
    collected
}

fn build_manifest(archive: &BackupArchive, path: &Path, bytes: &[u8]) -> BackupManifest {
    let mut symbols: Vec<String> = archive.series.iter().map(|s| s.key.symbol.clone()).collect();
    symbols.sort();
    symbols.dedup();
    let mut timeframes: Vec<Timeframe> = archive.series.iter().map(|s| s.key.timeframe).collect();
    timeframes.sort();
    timeframes.dedup();

    let all_bars = archive.series.iter().flat_map(|s| s.bars.iter());
    let data_start = all_bars.clone().map(|b| b.timestamp).min();
    let data_end = all_bars.clone().map(|b| b.timestamp).max();

    BackupManifest {
        backup_id: archive.backup_id.clone(),
        backup_type: archive.backup_type,
        symbols,
        timeframes,
        checksum: checksum(bytes),
        created_at: archive.created_at,
        file_path: path.display().to_string(),
        size_bytes: bytes.len() as u64,
        bar_count: all_bars.count(),
        series_count: archive.series.len(),
        data_start,
        data_end,
    }
}
