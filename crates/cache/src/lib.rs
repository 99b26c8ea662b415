//! 索引响应的磁盘缓存
//!
//! 每个索引一个子目录，每个包一个 JSON 文件。缓存默认关闭，
//! 只有显式启用时才会读写。

use chrono::{DateTime, Utc};
use pipstale_core::CatalogHit;
use pipstale_error::{Result, StaleError};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

const CACHE_DIR: &str = "pipstale";
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: Option<PathBuf>,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            ttl: DEFAULT_TTL,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    index: String,
    name: String,
    fetched_at: DateTime<Utc>,
    hits: Vec<CatalogHit>,
}

impl CachedResponse {
    fn age_secs(&self) -> i64 {
        (Utc::now() - self.fetched_at).num_seconds()
    }
}

fn cache_error(action: &str, err: impl Display) -> StaleError {
    StaleError::CacheError {
        message: format!("{}: {}", action, err),
    }
}

// 索引地址去掉协议后作为目录名
fn index_slug(index: &str) -> String {
    let trimmed = index
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(index)
        .trim_end_matches('/');
    trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}

// 与 PEP 503 一致：小写，连续的 `-_.` 合并为 `-`
fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    normalized
}

pub struct ResponseCache {
    root: PathBuf,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Result<Self> {
        let root = match config.cache_dir {
            Some(dir) => dir,
            None => dirs::cache_dir()
                .ok_or_else(|| StaleError::CacheError {
                    message: "无法获取缓存目录".to_string(),
                })?
                .join(CACHE_DIR),
        };

        Ok(Self {
            root,
            ttl: config.ttl,
        })
    }

    fn entry_path(&self, index: &str, name: &str) -> PathBuf {
        self.root
            .join(index_slug(index))
            .join(format!("{}.json", normalize_name(name)))
    }

    async fn read_entry(path: &Path) -> Result<CachedResponse> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| cache_error("读取缓存失败", e))?;
        serde_json::from_str(&content).map_err(|e| StaleError::JsonError {
            message: format!("解析缓存失败: {}", e),
        })
    }

    async fn write_entry(&self, entry: &CachedResponse) -> Result<()> {
        let path = self.entry_path(&entry.index, &entry.name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| cache_error("创建缓存目录失败", e))?;
        }

        let content = serde_json::to_string_pretty(entry).map_err(|e| StaleError::JsonError {
            message: format!("序列化缓存失败: {}", e),
        })?;
        fs::write(&path, content)
            .await
            .map_err(|e| cache_error("写入缓存失败", e))
    }

    /// 读取未过期的查询结果。名称大小写不同的查询共用一个文件，
    /// 但只有与写入时完全相同的名称才算命中。
    pub async fn load(&self, index: &str, name: &str) -> Result<Option<Vec<CatalogHit>>> {
        let path = self.entry_path(index, name);
        if !path.exists() {
            return Ok(None);
        }

        let entry = Self::read_entry(&path).await?;
        if entry.index != index || entry.name != name {
            debug!("缓存条目不匹配: {} ({})", name, index);
            return Ok(None);
        }
        if entry.age_secs() > self.ttl.as_secs() as i64 {
            debug!("缓存过期: {} ({})", name, index);
            return Ok(None);
        }

        debug!("缓存命中: {} ({})", name, index);
        Ok(Some(entry.hits))
    }

    pub async fn store(&self, index: &str, name: &str, hits: &[CatalogHit]) -> Result<()> {
        self.write_entry(&CachedResponse {
            index: index.to_string(),
            name: name.to_string(),
            fetched_at: Utc::now(),
            hits: hits.to_vec(),
        })
        .await
    }

    /// 删除早于 `older_than` 的条目以及无法解析的文件，返回删除数量
    pub async fn prune(&self, older_than: Duration) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let max_age = older_than.as_secs() as i64;
        let mut removed = 0;
        let mut index_dirs = fs::read_dir(&self.root)
            .await
            .map_err(|e| cache_error("读取缓存目录失败", e))?;

        while let Some(index_dir) = index_dirs
            .next_entry()
            .await
            .map_err(|e| cache_error("读取缓存目录失败", e))?
        {
            let dir = index_dir.path();
            if !dir.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(&dir)
                .await
                .map_err(|e| cache_error("读取缓存目录失败", e))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| cache_error("读取缓存条目失败", e))?
            {
                let path = file.path();
                if !matches!(path.extension(), Some(ext) if ext == "json") {
                    continue;
                }

                let stale = match Self::read_entry(&path).await {
                    Ok(entry) => entry.age_secs() > max_age,
                    Err(_) => true,
                };
                if stale {
                    fs::remove_file(&path)
                        .await
                        .map_err(|e| cache_error("删除过期缓存失败", e))?;
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!("已清理 {} 个过期缓存", removed);
        }

        Ok(removed)
    }
}
