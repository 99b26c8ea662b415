use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

impl InstalledPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// 索引针对一次查询返回的单条结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogHit {
    pub name: String,
    pub summary: Option<String>,
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutdatedEntry {
    pub name: String,
    pub installed_version: String,
    pub latest_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// 单个已安装包的扫描结果
#[derive(Debug)]
pub enum ScanOutcome {
    Outdated(OutdatedEntry),
    Current { name: String },
    NotFound { name: String },
    Skipped {
        name: String,
        reason: pipstale_error::StaleError,
    },
}

impl ScanOutcome {
    pub fn name(&self) -> &str {
        match self {
            ScanOutcome::Outdated(entry) => &entry.name,
            ScanOutcome::Current { name }
            | ScanOutcome::NotFound { name }
            | ScanOutcome::Skipped { name, .. } => name,
        }
    }

    pub fn into_entry(self) -> Option<OutdatedEntry> {
        match self {
            ScanOutcome::Outdated(entry) => Some(entry),
            _ => None,
        }
    }
}

/// 管道模式输出：以单个空格连接的包名
pub fn pipe_output(entries: &[OutdatedEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
