use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use pipstale_cache::{CacheConfig, ResponseCache};
use pipstale_cli::outdated::{ensure_no_arguments, run_outdated, OutdatedOptions};
use pipstale_cli::reporter::ConsoleReporter;
use pipstale_core::{CheckerConfig, OutputEncoding, DEFAULT_CONCURRENCY};
use pipstale_pip::{PipEnvironment, DEFAULT_PYTHON};
use pipstale_pypi::{PypiCatalog, PypiConfig, DEFAULT_INDEX_URL};
use std::io;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const OUTDATED_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const CACHE_PRUNE_AGE: Duration = Duration::from_secs(24 * 3600);
const EXIT_USAGE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "pipstale", version = env!("CARGO_PKG_VERSION"), about = "列出可更新的 Python 包")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 列出可更新的包
    Outdated {
        /// 包索引地址
        #[arg(long, value_name = "URL", default_value = DEFAULT_INDEX_URL)]
        index: String,
        /// 只检查当前虚拟环境中的包
        #[arg(short = 'l', long)]
        local: bool,
        /// 只输出以空格分隔的包名，便于通过管道传给其他命令
        #[arg(short = 'p', long = "pipe-only")]
        pipe_only: bool,
        /// 以 JSON 输出
        #[arg(long, conflicts_with = "pipe_only")]
        json: bool,
        /// 同时进行的索引查询数
        #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
        jobs: usize,
        /// 用于运行 pip 的 Python 解释器
        #[arg(long, default_value = DEFAULT_PYTHON)]
        python: String,
        /// 单次请求超时（秒）
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        timeout: u64,
        /// 复用 15 分钟内缓存的索引结果（默认每次都查询索引）
        #[arg(long)]
        cache: bool,
        #[arg(hide = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 日志输出到 stderr，避免干扰管道输出
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Outdated {
            index,
            local,
            pipe_only,
            json,
            jobs,
            python,
            timeout,
            cache,
            args,
        } => {
            if let Err(err) = ensure_no_arguments(&args) {
                eprintln!("{}", format!("错误: {}", err).bright_yellow());
                std::process::exit(EXIT_USAGE);
            }

            let options = OutdatedOptions {
                local_only: local,
                pipe_only,
                json,
            };
            let pypi = PypiConfig {
                index_url: index,
                timeout: Duration::from_secs(timeout),
                ..PypiConfig::default()
            };
            cmd_outdated(options, pypi, cache, python, jobs).await
        }
    }
}

async fn cmd_outdated(
    options: OutdatedOptions,
    pypi: PypiConfig,
    use_cache: bool,
    python: String,
    jobs: usize,
) -> Result<()> {
    run_with_timeout("检查更新超时", async {
        let cache = if use_cache {
            let cache = ResponseCache::new(CacheConfig::default()).context("创建缓存失败")?;
            if let Err(err) = cache.prune(CACHE_PRUNE_AGE).await {
                debug!("清理过期缓存失败: {}", err);
            }
            Some(Arc::new(cache))
        } else {
            None
        };

        let catalog = PypiCatalog::new(pypi, cache).context("初始化索引客户端失败")?;
        let source = PipEnvironment::new(python);
        let config = CheckerConfig {
            concurrency: jobs,
            encoding: OutputEncoding::detect(),
        };

        run_outdated(
            &options,
            &source,
            Arc::new(catalog),
            config,
            &ConsoleReporter,
            &mut io::stdout(),
        )
        .await?;

        Ok(())
    })
    .await
}

async fn run_with_timeout<F>(message: &'static str, fut: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    timeout(OUTDATED_TIMEOUT, fut)
        .await
        .map_err(|_| anyhow::anyhow!(message))?
}
