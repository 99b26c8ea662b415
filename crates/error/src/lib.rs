use thiserror::Error;

#[derive(Error, Debug)]
pub enum StaleError {
    #[error("命令不需要参数: {args}")]
    Usage { args: String },

    #[error("包索引不可用: {endpoint}, 原因: {reason}")]
    CatalogUnavailable { endpoint: String, reason: String },

    #[error("无法在当前输出编码中显示 {package} 的 {field}")]
    UnencodableEntry {
        package: String,
        field: &'static str,
    },

    #[error("命令执行失败: '{command}' (退出码: {exit_code})")]
    CommandFailed { command: String, exit_code: i32 },

    #[error("命令超时")]
    CommandTimeout,

    #[error("JSON解析失败: {message}")]
    JsonError { message: String },

    #[error("缓存错误: {message}")]
    CacheError { message: String },
}

impl StaleError {
    /// 仅 `CatalogUnavailable` 会中断整个扫描
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StaleError::UnencodableEntry { .. })
    }
}

pub type Result<T> = std::result::Result<T, StaleError>;
