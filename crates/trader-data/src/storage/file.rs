//! 파일 기반 L2 저장소.
//!
//! 키 문자열의 SHA-256 hex를 파일명으로 쓰고, 임시 파일에 쓴 뒤
//! rename하여 부분 기록된 문서가 보이지 않게 합니다.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::BarStore;
use crate::cache::{CacheEntry, CacheKey};
use crate::error::{DataError, Result};

const ENTRY_EXT: &str = "json";

/// 디렉터리 기반 저장소.
pub struct FileStore {
    dir: PathBuf,
    grace: Duration,
}

impl FileStore {
    /// 디렉터리를 열고 없으면 만듭니다.
    pub async fn open(dir: impl AsRef<Path>, grace: Duration) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "File store opened");
        Ok(Self { dir, grace })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXT))
    }

    async fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl BarStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entry = Self::read_entry(&self.path_for(key)).await?;
        // 해시 충돌 방지
        Ok(entry.filter(|e| &e.key == key))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(&entry.key);
        let tmp = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec(entry)?;

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(DataError::Io(e.to_string()));
        }

        debug!(key = %entry.key, bytes = bytes.len(), "File store entry written");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for path in self.entry_paths().await? {
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache file"),
            }
        }
        Ok(entries)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_paths().await? {
            let stale = match Self::read_entry(&path).await {
                Ok(Some(entry)) => entry.expires_at + self.grace <= now,
                Ok(None) => false,
                // 손상된 파일도 정리
                Err(_) => true,
            };
            if stale && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn health_check(&self) -> bool {
        tokio::fs::metadata(&self.dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}
