use crate::encoding::OutputEncoding;
use crate::package::{CatalogHit, InstalledPackage, OutdatedEntry, ScanOutcome};
use crate::reporter::Reporter;
use crate::source::CatalogClient;
use crate::version::{compare_versions, highest_version};
use pipstale_error::{Result, StaleError};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// 同时进行的索引查询数，1 表示逐个查询
    pub concurrency: usize,
    pub encoding: OutputEncoding,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            encoding: OutputEncoding::default(),
        }
    }
}

type SearchTask = (String, String, JoinHandle<Result<Vec<CatalogHit>>>);

/// 对比已安装版本与索引中的最新版本
pub struct OutdatedChecker<'a> {
    catalog: Arc<dyn CatalogClient>,
    reporter: &'a dyn Reporter,
    config: CheckerConfig,
}

impl<'a> OutdatedChecker<'a> {
    pub fn new(catalog: Arc<dyn CatalogClient>, reporter: &'a dyn Reporter) -> Self {
        Self {
            catalog,
            reporter,
            config: CheckerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CheckerConfig) -> Self {
        self.config = config;
        self
    }

    /// 返回所有过期的包，顺序与扫描顺序（包名升序）一致
    pub async fn list_outdated(
        &self,
        installed: &[InstalledPackage],
        quiet: bool,
    ) -> Result<Vec<OutdatedEntry>> {
        let outcomes = self.scan(installed, quiet).await?;
        Ok(outcomes
            .into_iter()
            .filter_map(ScanOutcome::into_entry)
            .collect())
    }

    /// 按包名升序逐个查询索引，每个包产生一个扫描结果。
    ///
    /// 查询可以并行进行，但结果始终按扫描顺序处理和报告。
    /// 任一查询失败时取消剩余查询并返回错误。
    pub async fn scan(
        &self,
        installed: &[InstalledPackage],
        quiet: bool,
    ) -> Result<Vec<ScanOutcome>> {
        let packages: BTreeMap<&str, &str> = installed
            .iter()
            .map(|pkg| (pkg.name.as_str(), pkg.version.as_str()))
            .collect();

        debug!(
            "扫描 {} 个已安装包，索引: {}，并发数: {}",
            packages.len(),
            self.catalog.endpoint(),
            self.config.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let tasks: Vec<SearchTask> = packages
            .into_iter()
            .map(|(name, version)| {
                let catalog = self.catalog.clone();
                let semaphore = semaphore.clone();
                let query = name.to_string();
                let handle = tokio::spawn(async move {
                    let _permit =
                        semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| StaleError::CatalogUnavailable {
                                endpoint: catalog.endpoint().to_string(),
                                reason: e.to_string(),
                            })?;
                    catalog.search(&query).await
                });
                (name.to_string(), version.to_string(), handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut pending = tasks.into_iter();
        while let Some((name, version, handle)) = pending.next() {
            let hits = match handle.await {
                Ok(Ok(hits)) => hits,
                Ok(Err(err)) => {
                    abort_all(pending);
                    return Err(err);
                }
                Err(err) => {
                    abort_all(pending);
                    return Err(StaleError::CatalogUnavailable {
                        endpoint: self.catalog.endpoint().to_string(),
                        reason: format!("查询任务失败: {}", err),
                    });
                }
            };

            let outcome = self.evaluate(&name, &version, hits)?;
            self.report(&outcome, quiet);
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn evaluate(
        &self,
        name: &str,
        installed_version: &str,
        hits: Vec<CatalogHit>,
    ) -> Result<ScanOutcome> {
        // 索引可能返回模糊匹配的结果，只接受名称完全一致的条目
        let matching: Vec<CatalogHit> = hits.into_iter().filter(|hit| hit.name == name).collect();

        match self.compare(name, installed_version, &matching) {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => Ok(ScanOutcome::NotFound {
                name: name.to_string(),
            }),
            Err(reason) if !reason.is_fatal() => Ok(ScanOutcome::Skipped {
                name: name.to_string(),
                reason,
            }),
            Err(err) => Err(err),
        }
    }

    fn compare(
        &self,
        name: &str,
        installed_version: &str,
        hits: &[CatalogHit],
    ) -> Result<Option<ScanOutcome>> {
        let versions: Vec<&str> = hits
            .iter()
            .flat_map(|hit| hit.versions.iter().map(String::as_str))
            .collect();
        let Some(latest) = highest_version(&versions) else {
            return Ok(None);
        };
        let summary = hits
            .iter()
            .find_map(|hit| hit.summary.clone())
            .filter(|summary| !summary.is_empty());

        self.ensure_encodable(name, "name", name)?;
        if let Some(summary) = &summary {
            self.ensure_encodable(name, "summary", summary)?;
        }
        self.ensure_encodable(name, "version", &latest)?;

        if compare_versions(installed_version, &latest) != Ordering::Less {
            return Ok(Some(ScanOutcome::Current {
                name: name.to_string(),
            }));
        }

        Ok(Some(ScanOutcome::Outdated(OutdatedEntry {
            name: name.to_string(),
            installed_version: installed_version.to_string(),
            latest_version: latest,
            summary,
        })))
    }

    fn ensure_encodable(&self, package: &str, field: &'static str, text: &str) -> Result<()> {
        if self.config.encoding.can_encode(text) {
            Ok(())
        } else {
            Err(StaleError::UnencodableEntry {
                package: package.to_string(),
                field,
            })
        }
    }

    fn report(&self, outcome: &ScanOutcome, quiet: bool) {
        let name = outcome.name();
        match outcome {
            ScanOutcome::Outdated(entry) => {
                debug!(
                    "{} 可更新: {} -> {}",
                    name, entry.installed_version, entry.latest_version
                );
                if !quiet {
                    self.reporter.notify(&format!(
                        "{} {} ({})",
                        name, entry.installed_version, entry.latest_version
                    ));
                }
            }
            ScanOutcome::Skipped { reason, .. } => {
                warn!("跳过 {}: {}", name, reason);
                if !quiet {
                    self.reporter.warn(&format!("跳过 {}: {}", name, reason));
                }
            }
            ScanOutcome::NotFound { .. } => debug!("索引中没有 {}", name),
            ScanOutcome::Current { .. } => debug!("{} 已是最新版本", name),
        }
    }
}

fn abort_all(tasks: impl Iterator<Item = SearchTask>) {
    for (_, _, handle) in tasks {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::SilentReporter;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeCatalog {
        hits: HashMap<String, Vec<CatalogHit>>,
        failing: HashSet<String>,
        delays: HashMap<String, Duration>,
        completed: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn with(mut self, query: &str, name: &str, summary: Option<&str>, versions: &[&str]) -> Self {
            self.hits.entry(query.to_string()).or_default().push(CatalogHit {
                name: name.to_string(),
                summary: summary.map(str::to_string),
                versions: versions.iter().map(|v| v.to_string()).collect(),
            });
            self
        }

        fn failing(mut self, query: &str) -> Self {
            self.failing.insert(query.to_string());
            self
        }

        fn delayed(mut self, query: &str, millis: u64) -> Self {
            self.delays
                .insert(query.to_string(), Duration::from_millis(millis));
            self
        }
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        fn endpoint(&self) -> &str {
            "fake://catalog"
        }

        async fn search(&self, name: &str) -> Result<Vec<CatalogHit>> {
            if let Some(delay) = self.delays.get(name) {
                tokio::time::sleep(*delay).await;
            }
            self.completed.lock().unwrap().push(name.to_string());
            if self.failing.contains(name) {
                return Err(StaleError::CatalogUnavailable {
                    endpoint: self.endpoint().to_string(),
                    reason: "连接被拒绝".to_string(),
                });
            }
            Ok(self.hits.get(name).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        notices: Mutex<Vec<String>>,
        warnings: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn notify(&self, message: &str) {
            self.notices.lock().unwrap().push(message.to_string());
        }

        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
    }

    fn installed(pairs: &[(&str, &str)]) -> Vec<InstalledPackage> {
        pairs
            .iter()
            .map(|(name, version)| InstalledPackage::new(*name, *version))
            .collect()
    }

    fn names(entries: &[OutdatedEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_no_entry_when_catalog_is_not_newer() {
        let catalog = FakeCatalog::default().with("foo", "foo", None, &["0.9", "1.0"]);
        let reporter = RecordingReporter::default();
        let checker = OutdatedChecker::new(Arc::new(catalog), &reporter);

        let entries = checker
            .list_outdated(&installed(&[("foo", "1.0")]), false)
            .await
            .unwrap();

        assert!(entries.is_empty());
        assert!(reporter.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_is_maximum_not_first() {
        let catalog = FakeCatalog::default().with("foo", "foo", None, &["1.2", "1.10", "1.9"]);
        let checker = OutdatedChecker::new(Arc::new(catalog), &SilentReporter);

        let entries = checker
            .list_outdated(&installed(&[("foo", "1.9")]), true)
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].installed_version, "1.9");
        assert_eq!(entries[0].latest_version, "1.10");
    }

    #[tokio::test]
    async fn test_pre_release_installed_is_outdated_by_final() {
        let catalog = FakeCatalog::default().with("foo", "foo", None, &["1.0rc1", "1.0"]);
        let checker = OutdatedChecker::new(Arc::new(catalog), &SilentReporter);

        let entries = checker
            .list_outdated(&installed(&[("foo", "1.0rc1")]), true)
            .await
            .unwrap();

        assert_eq!(entries[0].latest_version, "1.0");
    }

    #[tokio::test]
    async fn test_only_exact_name_hits_count() {
        let catalog = FakeCatalog::default()
            .with("foo", "foo-bar", None, &["9.0"])
            .with("foo", "Foo", None, &["9.0"])
            .with("foo-bar", "foo-bar", None, &["1.0"]);
        let checker = OutdatedChecker::new(Arc::new(catalog), &SilentReporter);

        let outcomes = checker
            .scan(&installed(&[("foo", "1.0"), ("foo-bar", "1.0")]), true)
            .await
            .unwrap();

        assert!(matches!(&outcomes[0], ScanOutcome::NotFound { name } if name == "foo"));
        assert!(matches!(&outcomes[1], ScanOutcome::Current { name } if name == "foo-bar"));
    }

    #[tokio::test]
    async fn test_hits_with_same_name_are_merged() {
        let catalog = FakeCatalog::default()
            .with("foo", "foo", Some("Foo library"), &["1.0"])
            .with("foo", "foo", None, &["2.0"]);
        let checker = OutdatedChecker::new(Arc::new(catalog), &SilentReporter);

        let entries = checker
            .list_outdated(&installed(&[("foo", "1.0")]), true)
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].latest_version, "2.0");
        assert_eq!(entries[0].summary.as_deref(), Some("Foo library"));
    }

    #[tokio::test]
    async fn test_results_follow_name_order() {
        let catalog = FakeCatalog::default()
            .with("gamma", "gamma", None, &["3.0"])
            .with("alpha", "alpha", None, &["2.0"])
            .with("beta", "beta", None, &["1.5"]);
        let reporter = RecordingReporter::default();
        let checker = OutdatedChecker::new(Arc::new(catalog), &reporter).with_config(CheckerConfig {
            concurrency: 3,
            ..CheckerConfig::default()
        });

        let entries = checker
            .list_outdated(
                &installed(&[("gamma", "1.0"), ("alpha", "1.0"), ("beta", "1.0")]),
                false,
            )
            .await
            .unwrap();

        assert_eq!(names(&entries), vec!["alpha", "beta", "gamma"]);
        assert_eq!(
            *reporter.notices.lock().unwrap(),
            vec!["alpha 1.0 (2.0)", "beta 1.0 (1.5)", "gamma 1.0 (3.0)"]
        );
    }

    #[tokio::test]
    async fn test_slow_queries_keep_name_order() {
        let catalog = Arc::new(
            FakeCatalog::default()
                .with("alpha", "alpha", None, &["2.0"])
                .with("beta", "beta", None, &["2.0"])
                .with("gamma", "gamma", None, &["2.0"])
                .delayed("alpha", 150)
                .delayed("beta", 75),
        );
        let reporter = RecordingReporter::default();
        let checker =
            OutdatedChecker::new(catalog.clone(), &reporter).with_config(CheckerConfig {
                concurrency: 3,
                ..CheckerConfig::default()
            });

        let entries = checker
            .list_outdated(
                &installed(&[("alpha", "1.0"), ("beta", "1.0"), ("gamma", "1.0")]),
                false,
            )
            .await
            .unwrap();

        // 查询按相反顺序完成
        assert_eq!(*catalog.completed.lock().unwrap(), vec!["gamma", "beta", "alpha"]);
        assert_eq!(names(&entries), vec!["alpha", "beta", "gamma"]);
        assert_eq!(
            *reporter.notices.lock().unwrap(),
            vec!["alpha 1.0 (2.0)", "beta 1.0 (2.0)", "gamma 1.0 (2.0)"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_installed_names_yield_one_entry() {
        let catalog = FakeCatalog::default().with("foo", "foo", None, &["2.0"]);
        let checker = OutdatedChecker::new(Arc::new(catalog), &SilentReporter);

        let entries = checker
            .list_outdated(&installed(&[("foo", "1.0"), ("foo", "1.0")]), true)
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let catalog: Arc<dyn CatalogClient> = Arc::new(
            FakeCatalog::default()
                .with("alpha", "alpha", None, &["2.0"])
                .with("beta", "beta", None, &["1.0"]),
        );
        let checker = OutdatedChecker::new(catalog, &SilentReporter);
        let packages = installed(&[("alpha", "1.0"), ("beta", "1.0")]);

        let first = checker.list_outdated(&packages, true).await.unwrap();
        let second = checker.list_outdated(&packages, true).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unencodable_summary_is_skipped() {
        let catalog = FakeCatalog::default()
            .with("alpha", "alpha", Some("Ünïcode summary"), &["2.0"])
            .with("beta", "beta", Some("plain summary"), &["2.0"]);
        let reporter = RecordingReporter::default();
        let checker = OutdatedChecker::new(Arc::new(catalog), &reporter).with_config(CheckerConfig {
            concurrency: 1,
            encoding: OutputEncoding::Ascii,
        });

        let outcomes = checker
            .scan(&installed(&[("alpha", "1.0"), ("beta", "1.0")]), false)
            .await
            .unwrap();

        assert!(matches!(
            &outcomes[0],
            ScanOutcome::Skipped { name, reason: StaleError::UnencodableEntry { field: "summary", .. } }
                if name == "alpha"
        ));
        assert!(matches!(&outcomes[1], ScanOutcome::Outdated(entry) if entry.name == "beta"));
        assert_eq!(reporter.warnings.lock().unwrap().len(), 1);
        assert_eq!(*reporter.notices.lock().unwrap(), vec!["beta 1.0 (2.0)"]);
    }

    #[tokio::test]
    async fn test_catalog_failure_aborts_scan() {
        let catalog = FakeCatalog::default()
            .with("alpha", "alpha", None, &["2.0"])
            .with("gamma", "gamma", None, &["2.0"])
            .failing("beta");
        let reporter = RecordingReporter::default();
        let checker = OutdatedChecker::new(Arc::new(catalog), &reporter).with_config(CheckerConfig {
            concurrency: 1,
            ..CheckerConfig::default()
        });

        let result = checker
            .list_outdated(
                &installed(&[("alpha", "1.0"), ("beta", "1.0"), ("gamma", "1.0")]),
                false,
            )
            .await;

        assert!(matches!(
            result,
            Err(StaleError::CatalogUnavailable { .. })
        ));
        assert_eq!(*reporter.notices.lock().unwrap(), vec!["alpha 1.0 (2.0)"]);
    }

    #[tokio::test]
    async fn test_quiet_suppresses_progress() {
        let catalog = FakeCatalog::default().with("foo", "foo", None, &["2.0"]);
        let reporter = RecordingReporter::default();
        let checker = OutdatedChecker::new(Arc::new(catalog), &reporter);

        let entries = checker
            .list_outdated(&installed(&[("foo", "1.0")]), true)
            .await
            .unwrap();

        assert_eq!(names(&entries), vec!["foo"]);
        assert!(reporter.notices.lock().unwrap().is_empty());
    }
}
