//! PyPI JSON API 客户端

use async_trait::async_trait;
use pipstale_cache::ResponseCache;
use pipstale_core::{CatalogClient, CatalogHit, RetryPolicy};
use pipstale_error::{Result, StaleError};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 默认索引地址
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PypiConfig {
    pub index_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PypiConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    info: ProjectInfo,
    #[serde(default)]
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    name: String,
    #[serde(default)]
    summary: Option<String>,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    #[serde(default)]
    yanked: bool,
}

impl ProjectResponse {
    fn into_hit(self) -> CatalogHit {
        // 没有 releases 字段的旧式响应只给出 info.version
        let versions = if self.releases.is_empty() {
            vec![self.info.version]
        } else {
            // 没有可下载文件或文件全部被撤回的版本不算已发布
            self.releases
                .into_iter()
                .filter(|(_, files)| files.iter().any(|file| !file.yanked))
                .map(|(version, _)| version)
                .collect()
        };

        CatalogHit {
            name: self.info.name,
            summary: self.info.summary.filter(|summary| !summary.trim().is_empty()),
            versions,
        }
    }
}

#[derive(Debug)]
struct FetchFailure {
    reason: String,
    /// 连接失败、超时、5xx 与 429 可以重试
    transient: bool,
}

impl FetchFailure {
    fn transient(reason: String) -> Self {
        Self {
            reason,
            transient: true,
        }
    }

    fn permanent(reason: String) -> Self {
        Self {
            reason,
            transient: false,
        }
    }
}

pub struct PypiCatalog {
    client: Client,
    cache: Option<Arc<ResponseCache>>,
    config: PypiConfig,
}

impl PypiCatalog {
    /// `cache` 为 `None` 时每次查询都直接访问索引
    pub fn new(mut config: PypiConfig, cache: Option<Arc<ResponseCache>>) -> Result<Self> {
        config.index_url = config.index_url.trim_end_matches('/').to_string();

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("pipstale/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StaleError::CatalogUnavailable {
                endpoint: config.index_url.clone(),
                reason: format!("创建 HTTP 客户端失败: {}", e),
            })?;

        Ok(Self {
            client,
            cache,
            config,
        })
    }

    async fn fetch(&self, name: &str) -> std::result::Result<Vec<CatalogHit>, FetchFailure> {
        let url = format!("{}/{}/json", self.config.index_url, name);
        debug!("查询索引: {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchFailure::transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("索引中不存在 {}", name);
            return Ok(Vec::new());
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchFailure::transient(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(FetchFailure::permanent(format!("HTTP {}", status)));
        }

        let project: ProjectResponse = response.json().await.map_err(|e| {
            let reason = format!("响应格式错误: {}", e);
            if e.is_decode() {
                FetchFailure::permanent(reason)
            } else {
                FetchFailure::transient(reason)
            }
        })?;

        Ok(vec![project.into_hit()])
    }
}

#[async_trait]
impl CatalogClient for PypiCatalog {
    fn endpoint(&self) -> &str {
        &self.config.index_url
    }

    async fn search(&self, name: &str) -> Result<Vec<CatalogHit>> {
        let index = self.config.index_url.as_str();

        if let Some(cache) = &self.cache {
            match cache.load(index, name).await {
                Ok(Some(hits)) => {
                    debug!("使用缓存的索引结果: {}", name);
                    return Ok(hits);
                }
                Ok(None) => {}
                Err(err) => debug!("忽略无法读取的缓存 {}: {}", name, err),
            }
        }

        let hits = self
            .config
            .retry
            .run(|failure: &FetchFailure| failure.transient, || self.fetch(name))
            .await
            .map_err(|failure| StaleError::CatalogUnavailable {
                endpoint: index.to_string(),
                reason: failure.reason,
            })?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(index, name, &hits).await {
                warn!("写入缓存失败: {}", err);
            }
        }

        Ok(hits)
    }
}
