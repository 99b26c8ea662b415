use crate::package::{CatalogHit, InstalledPackage};
use async_trait::async_trait;
use pipstale_error::Result;

/// 远程包索引
#[async_trait]
pub trait CatalogClient: Send + Sync {
    fn endpoint(&self) -> &str;

    /// 按包名精确查询，索引中不存在该包时返回空列表
    async fn search(&self, name: &str) -> Result<Vec<CatalogHit>>;
}

/// 本地安装环境
#[async_trait]
pub trait InstalledSource: Send + Sync {
    fn name(&self) -> &str;

    async fn list_installed(&self, local_only: bool) -> Result<Vec<InstalledPackage>>;
}
