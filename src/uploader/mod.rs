// 上传引擎模块
//
// - 按文件大小选择上传策略（单次 PUT / 可续传会话）
// - 可续传会话的分片循环，带退避重试和取消
// - 远程文件夹逐级创建，FolderCache 去重
// - 文件夹上传：顺序预建目录，再用有界 worker 池并发上传

pub mod chunk;
pub mod engine;
pub mod folder;
pub mod folder_cache;
pub mod manager;
pub mod options;
pub mod remote_folder;
pub mod single;
pub mod task;

pub use chunk::{
    plan_chunks, validate_chunk_size, ChunkReader, SessionState, UploadSession, CHUNK_ALIGNMENT,
    DEFAULT_CHUNK_SIZE,
};
pub use engine::ChunkedSessionUploader;
pub use folder::{FolderScanner, ScanOptions, ScanResult, ScannedFile};
pub use folder_cache::FolderCache;
pub use manager::{DirectoryUploadOrchestrator, UploadContext};
pub use options::{RetryPolicy, UploadOptions, UploadOptionsBuilder};
pub use remote_folder::RemoteFolderCreator;
pub use single::SingleShotUploader;
pub use task::{FailedUpload, UploadOutcome, UploadSummary, UploadTask};

use crate::error::{UploadError, UploadResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 使用可续传会话的文件大小阈值: 4MiB（含）
pub const CHUNKED_UPLOAD_THRESHOLD: u64 = 4 * 1024 * 1024;

/// 上传策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// 单次 PUT 上传
    SingleShot,
    /// 可续传会话分片上传
    Chunked,
}

/// 🔥 根据文件大小选择上传策略
///
/// 大小 >= 4MiB 使用分片会话，否则单次 PUT
pub fn select_strategy(file_size: u64) -> UploadStrategy {
    if file_size >= CHUNKED_UPLOAD_THRESHOLD {
        UploadStrategy::Chunked
    } else {
        UploadStrategy::SingleShot
    }
}

/// 取本地文件名（用作远程文件名）
pub(crate) fn file_name_of(local_path: &Path) -> UploadResult<String> {
    local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| UploadError::validation(format!("无法获取文件名: {:?}", local_path)))
}

/// 辅助函数：格式化字节大小
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
