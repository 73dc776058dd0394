// 配置管理模块

use crate::error::UploadResult;
use crate::uploader::{RetryPolicy, UploadOptions, CHUNK_ALIGNMENT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Graph 接口配置
    #[serde(default)]
    pub graph: GraphConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// Graph 接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// API 根地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 目标用户（为空时使用 me/drive）
    #[serde(default)]
    pub user_id: Option<String>,
    /// 元数据请求超时（秒）
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,
    /// 分片上传请求超时（秒）
    #[serde(default = "default_chunk_timeout_secs")]
    pub chunk_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_metadata_timeout_secs() -> u64 {
    30
}

fn default_chunk_timeout_secs() -> u64 {
    120
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_id: None,
            metadata_timeout_secs: default_metadata_timeout_secs(),
            chunk_timeout_secs: default_chunk_timeout_secs(),
        }
    }
}

impl GraphConfig {
    /// 网盘相对路径：me/drive 或 users/{id}/drive
    pub fn drive_path(&self) -> String {
        match self.user_id.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => {
                format!("users/{}/drive", urlencoding::encode(user))
            }
            _ => "me/drive".to_string(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 文件夹上传时的最大并发文件数
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// 分片大小 (KiB)，必须是 320 的整数倍
    #[serde(default = "default_chunk_size_kib")]
    pub chunk_size_kib: u64,
    /// 单个分片最大尝试次数
    #[serde(default = "default_max_chunk_attempts")]
    pub max_chunk_attempts: u32,
    /// 重试基础等待时间（秒），第 n 次失败后等待 n 倍
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// 上传文件夹时是否跳过隐藏文件（以.开头的文件/文件夹）
    #[serde(default)]
    pub skip_hidden_files: bool,
}

fn default_max_workers() -> usize {
    4
}

fn default_chunk_size_kib() -> u64 {
    10 * 320
}

fn default_max_chunk_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            chunk_size_kib: default_chunk_size_kib(),
            max_chunk_attempts: default_max_chunk_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            skip_hidden_files: false,
        }
    }
}

impl UploadConfig {
    /// 转换为运行时上传参数（会校验分片大小和并发数）
    pub fn to_options(&self) -> UploadResult<UploadOptions> {
        UploadOptions::builder()
            .max_workers(self.max_workers)
            .chunk_size(self.chunk_size_kib * 1024)
            .retry(RetryPolicy {
                max_attempts: self.max_chunk_attempts,
                base_delay: Duration::from_secs(self.retry_delay_secs),
            })
            .skip_hidden(self.skip_hidden_files)
            .build()
    }

    /// 分片大小是否合法
    pub fn chunk_size_is_aligned(&self) -> bool {
        let bytes = self.chunk_size_kib * 1024;
        bytes > 0 && bytes % CHUNK_ALIGNMENT == 0
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        if !config.upload.chunk_size_is_aligned() {
            anyhow::bail!(
                "配置文件中的分片大小无效: {} KiB（必须是 320 KiB 的整数倍）",
                config.upload.chunk_size_kib
            );
        }

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }
}
