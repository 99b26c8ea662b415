pub mod checker;
pub mod encoding;
pub mod package;
pub mod reporter;
pub mod retry;
pub mod source;
pub mod version;

pub use checker::{CheckerConfig, OutdatedChecker, DEFAULT_CONCURRENCY};
pub use encoding::OutputEncoding;
pub use package::{pipe_output, CatalogHit, InstalledPackage, OutdatedEntry, ScanOutcome};
pub use reporter::{Reporter, SilentReporter};
pub use retry::RetryPolicy;
pub use source::{CatalogClient, InstalledSource};
pub use version::{compare_versions, highest_version, Version};
