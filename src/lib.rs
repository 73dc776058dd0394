// Graph Drive Uploader Library
// Graph 兼容网盘的可续传批量上传引擎

// 访问令牌模块
pub mod auth;

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 网盘API模块
pub mod graph;

// 日志模块
pub mod logging;

// 上传引擎模块
pub mod uploader;

#[cfg(test)]
pub(crate) mod test_support;

// 导出常用类型
pub use auth::{CachedTokenProvider, StaticTokenProvider, TokenProvider};
pub use config::AppConfig;
pub use error::{UploadError, UploadResult};
pub use graph::{DriveClient, DriveItem, HttpTransport, ReqwestTransport};
pub use uploader::{
    select_strategy, ChunkedSessionUploader, DirectoryUploadOrchestrator, FolderCache,
    RemoteFolderCreator, SingleShotUploader, UploadOptions, UploadStrategy, UploadSummary,
};
