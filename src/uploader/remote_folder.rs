// 远程文件夹逐级创建
//
// ensure_folder 逐段走路径：
// 1. 缓存命中则跳过
// 2. GET 查询，成功即存在
// 3. 否则 POST 创建（conflictBehavior=fail），409 视为已存在
// 4. 成功后写入缓存
//
// 缓存条目可能已失效（远端目录被外部删除）。某段创建失败且路径上
// 有缓存命中的祖先时，使该祖先失效并不走缓存重新校验一遍
//
// 多个 worker 并发确保同一目录时，最坏情况是重复的 GET/POST，
// 落败的一方收到 409，结果仍然正确

use crate::error::{UploadError, UploadResult};
use crate::graph::{normalize_remote_path, DriveClient, FolderCreation};
use crate::uploader::FolderCache;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RemoteFolderCreator {
    client: DriveClient,
    cache: Arc<FolderCache>,
}

impl RemoteFolderCreator {
    pub fn new(client: DriveClient, cache: Arc<FolderCache>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &Arc<FolderCache> {
        &self.cache
    }

    /// 确保远程路径上的每一级文件夹都存在
    pub async fn ensure_folder(&self, path: &str) -> UploadResult<()> {
        let normalized = normalize_remote_path(path);
        if normalized.is_empty() || self.cache.contains(&normalized) {
            return Ok(());
        }

        match self.walk(&normalized, true).await {
            Ok(()) => Ok(()),
            Err((e, Some(cached))) => {
                warn!(
                    "创建远程文件夹失败，缓存条目可能已失效: {}, 重新校验: {}",
                    cached, e
                );
                self.cache.invalidate(&cached);
                self.walk(&normalized, false).await.map_err(|(e, _)| e)
            }
            Err((e, None)) => Err(e),
        }
    }

    /// 逐段确保存在；失败时一并返回路径上第一个缓存命中的祖先
    async fn walk(
        &self,
        normalized: &str,
        use_cache: bool,
    ) -> Result<(), (UploadError, Option<String>)> {
        let mut parent = String::new();
        let mut first_hit: Option<String> = None;

        for segment in normalized.split('/') {
            let current = if parent.is_empty() {
                segment.to_string()
            } else {
                format!("{}/{}", parent, segment)
            };

            if use_cache && self.cache.contains(&current) {
                first_hit.get_or_insert_with(|| current.clone());
            } else {
                if let Err(e) = self.ensure_segment(&parent, segment, &current).await {
                    return Err((e, first_hit));
                }
                self.cache.insert(&current);
            }

            parent = current;
        }

        Ok(())
    }

    async fn ensure_segment(&self, parent: &str, name: &str, full: &str) -> UploadResult<()> {
        // GET 的任何失败（包括 403 和 5xx）都按不存在处理，真正的错误由创建请求暴露
        match self.client.get_item(full).await {
            Ok(_) => {
                debug!("远程文件夹已存在: {}", full);
                return Ok(());
            }
            Err(e) => debug!("远程文件夹查询失败，尝试创建: {}, {}", full, e),
        }

        match self.client.create_folder(parent, name).await? {
            FolderCreation::Created(item) => info!("✓ 创建远程文件夹: {} (id={})", full, item.id),
            FolderCreation::AlreadyExists => debug!("远程文件夹已被并发创建: {}", full),
        }
        Ok(())
    }
}
