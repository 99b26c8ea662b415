use anyhow::{Context, Result};
use pipstale_core::{
    pipe_output, CatalogClient, CheckerConfig, InstalledSource, OutdatedChecker, OutdatedEntry,
    Reporter,
};
use pipstale_error::StaleError;
use std::io::Write;
use std::sync::Arc;

pub const SEARCHING_NOTICE: &str = "正在查找过期的包，请稍候...";
pub const UP_TO_DATE_NOTICE: &str = "✓ 所有包都是最新版本";

#[derive(Debug, Clone, Default)]
pub struct OutdatedOptions {
    /// 只检查当前虚拟环境中的包
    pub local_only: bool,
    /// 只输出以空格分隔的包名
    pub pipe_only: bool,
    pub json: bool,
}

impl OutdatedOptions {
    fn quiet(&self) -> bool {
        self.pipe_only || self.json
    }
}

/// `outdated` 命令不接受位置参数
pub fn ensure_no_arguments(args: &[String]) -> pipstale_error::Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(StaleError::Usage {
            args: args.join(" "),
        })
    }
}

/// 执行一次完整的检查并把结果写入 `out`
pub async fn run_outdated<W: Write>(
    options: &OutdatedOptions,
    source: &dyn InstalledSource,
    catalog: Arc<dyn CatalogClient>,
    config: CheckerConfig,
    reporter: &dyn Reporter,
    out: &mut W,
) -> Result<Vec<OutdatedEntry>> {
    if !options.quiet() {
        reporter.notify(SEARCHING_NOTICE);
    }

    let installed = source
        .list_installed(options.local_only)
        .await
        .with_context(|| format!("读取 {} 已安装包失败", source.name()))?;

    let endpoint = catalog.endpoint().to_string();
    let checker = OutdatedChecker::new(catalog, reporter).with_config(config);
    let entries = checker
        .list_outdated(&installed, options.quiet())
        .await
        .with_context(|| format!("检查 {} 更新失败", endpoint))?;

    if options.pipe_only {
        write!(out, "{}", pipe_output(&entries))?;
        out.flush()?;
    } else if options.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
    } else if entries.is_empty() {
        reporter.notify(UP_TO_DATE_NOTICE);
    }

    Ok(entries)
}
