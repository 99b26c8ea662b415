use async_trait::async_trait;
use pipstale_core::{InstalledPackage, InstalledSource, RetryPolicy};
use pipstale_error::{Result, StaleError};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PYTHON: &str = "python3";

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    version: String,
}

/// 通过 `python -m pip list` 读取已安装的包
pub struct PipEnvironment {
    python: String,
}

impl Default for PipEnvironment {
    fn default() -> Self {
        Self::new(DEFAULT_PYTHON)
    }
}

impl PipEnvironment {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn list_args(local_only: bool) -> Vec<&'static str> {
        let mut args = vec!["-m", "pip", "list", "--format=json", "--disable-pip-version-check"];
        if local_only {
            args.push("--local");
        }
        args
    }

    async fn exec(&self, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.python, args.join(" "));
        debug!("执行命令: {}", command);

        // 只重试超时，非零退出码直接返回
        let is_timeout = |err: &StaleError| matches!(err, StaleError::CommandTimeout);
        RetryPolicy::default().run(is_timeout, || async {
            let output = timeout(COMMAND_TIMEOUT, Command::new(&self.python).args(args).output())
                .await
                .map_err(|_| StaleError::CommandTimeout)?
                .map_err(|_| StaleError::CommandFailed {
                    command: command.clone(),
                    exit_code: -1,
                })?;

            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                Err(StaleError::CommandFailed {
                    command: command.clone(),
                    exit_code: output.status.code().unwrap_or(-1),
                })
            }
        })
        .await
    }

    fn parse_list_output(output: &str) -> Result<Vec<InstalledPackage>> {
        // pip 可能在 JSON 之前输出警告行
        let json = output
            .find('[')
            .map(|start| &output[start..])
            .ok_or_else(|| StaleError::JsonError {
                message: "pip list 输出中没有 JSON 数组".to_string(),
            })?;

        let entries: Vec<ListEntry> =
            serde_json::from_str(json.trim()).map_err(|e| StaleError::JsonError {
                message: format!("解析 pip list 输出失败: {}", e),
            })?;

        Ok(entries
            .into_iter()
            .map(|entry| InstalledPackage::new(entry.name, entry.version))
            .collect())
    }
}

#[async_trait]
impl InstalledSource for PipEnvironment {
    fn name(&self) -> &str {
        "pip"
    }

    async fn list_installed(&self, local_only: bool) -> Result<Vec<InstalledPackage>> {
        let args = Self::list_args(local_only);
        let output = self.exec(&args).await?;
        let packages = Self::parse_list_output(&output)?;
        debug!("pip 已安装包: {} 个", packages.len());

        Ok(packages)
    }
}
