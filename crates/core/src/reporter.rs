/// 进度与警告输出，由调用方注入
pub trait Reporter: Send + Sync {
    fn notify(&self, message: &str);

    fn warn(&self, message: &str);
}

/// 丢弃所有输出
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn notify(&self, _message: &str) {}

    fn warn(&self, _message: &str) {}
}
