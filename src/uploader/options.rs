// 上传运行参数

use crate::error::{UploadError, UploadResult};
use crate::uploader::chunk::{validate_chunk_size, DEFAULT_CHUNK_SIZE};
use std::time::Duration;

/// 默认最大并发文件数
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// 默认单分片最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// 默认重试基础等待时间
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// 分片重试策略：线性退避，第 n 次失败后等待 n × base_delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// 第 attempt 次（从 1 开始）失败后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// 上传参数
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// 文件夹上传的最大并发文件数
    pub max_workers: usize,
    /// 分片大小（字节，320 KiB 的整数倍）
    pub chunk_size: u64,
    /// 分片重试策略
    pub retry: RetryPolicy,
    /// 扫描本地文件夹时跳过隐藏文件
    pub skip_hidden: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            skip_hidden: false,
        }
    }
}

impl UploadOptions {
    pub fn builder() -> UploadOptionsBuilder {
        UploadOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptionsBuilder {
    options: UploadOptions,
}

impl UploadOptionsBuilder {
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.options.max_workers = max_workers;
        self
    }

    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.options.chunk_size = chunk_size;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = retry;
        self
    }

    pub fn skip_hidden(mut self, skip_hidden: bool) -> Self {
        self.options.skip_hidden = skip_hidden;
        self
    }

    /// 校验并生成参数
    pub fn build(self) -> UploadResult<UploadOptions> {
        let options = self.options;
        if options.max_workers == 0 {
            return Err(UploadError::validation("并发文件数必须大于 0"));
        }
        if options.retry.max_attempts == 0 {
            return Err(UploadError::validation("分片尝试次数必须大于 0"));
        }
        validate_chunk_size(options.chunk_size)?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::CHUNK_ALIGNMENT;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(15));
    }

    #[test]
    fn test_builder_defaults() {
        let options = UploadOptions::builder().build().unwrap();
        assert_eq!(options.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(options.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(options.retry.max_attempts, 3);
    }

    #[test]
    fn test_builder_validation() {
        assert!(UploadOptions::builder().max_workers(0).build().is_err());
        assert!(UploadOptions::builder()
            .chunk_size(CHUNK_ALIGNMENT + 1)
            .build()
            .is_err());
        assert!(UploadOptions::builder()
            .retry(RetryPolicy {
                max_attempts: 0,
                base_delay: Duration::ZERO,
            })
            .build()
            .is_err());
        assert!(UploadOptions::builder()
            .chunk_size(CHUNK_ALIGNMENT * 4)
            .build()
            .is_ok());
    }
}
