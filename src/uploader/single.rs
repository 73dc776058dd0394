// 单次 PUT 上传（小于 4MiB 的文件）

use crate::error::{UploadError, UploadResult};
use crate::graph::{DriveClient, DriveItem};
use crate::uploader::{file_name_of, format_bytes};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// 单次上传超时下限（秒）
pub const SINGLE_SHOT_MIN_TIMEOUT_SECS: u64 = 60;
/// 单次上传超时上限（秒）
pub const SINGLE_SHOT_MAX_TIMEOUT_SECS: u64 = 300;

/// 按文件大小计算超时：每 MiB 60 秒，限制在 [60, 300] 秒
pub fn single_shot_timeout(file_size: u64) -> Duration {
    let mib = file_size.div_ceil(1024 * 1024);
    let secs = (mib * 60).clamp(SINGLE_SHOT_MIN_TIMEOUT_SECS, SINGLE_SHOT_MAX_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// 根据扩展名推断 Content-Type
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[derive(Clone)]
pub struct SingleShotUploader {
    client: DriveClient,
}

impl SingleShotUploader {
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    /// 读取整个文件并一次 PUT 上传，已存在的同名文件被覆盖
    pub async fn upload(&self, local_path: &Path, remote_folder: &str) -> UploadResult<DriveItem> {
        let file_name = file_name_of(local_path)?;
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| UploadError::local_io(local_path, e))?;
        let size = data.len() as u64;

        info!(
            "单次上传: {} -> {}/{} ({})",
            local_path.display(),
            remote_folder,
            file_name,
            format_bytes(size)
        );

        let item = self
            .client
            .upload_content(
                remote_folder,
                &file_name,
                data,
                &content_type_for(local_path),
                single_shot_timeout(size),
            )
            .await?;

        info!("✓ 单次上传完成: {} (id={})", file_name, item.id);
        Ok(item)
    }
}
