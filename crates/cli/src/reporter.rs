use colored::*;
use pipstale_core::Reporter;

/// 提示输出到标准输出，警告输出到标准错误
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn notify(&self, message: &str) {
        println!("{}", message);
    }

    fn warn(&self, message: &str) {
        eprintln!("{}", format!("警告: {}", message).bright_yellow());
    }
}
