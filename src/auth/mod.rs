// 访问令牌提供者
//
// 令牌获取（OAuth 流程）由外部负责，这里只定义能力接口：
// 引擎每次请求都向提供者要令牌，自身不持久化令牌

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// 访问令牌提供者，需支持并发调用
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Result<String>;
}

/// 固定令牌（命令行传入或测试使用）
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Result<String> {
        if self.token.is_empty() {
            anyhow::bail!("访问令牌为空");
        }
        Ok(self.token.clone())
    }
}

/// 带缓存的令牌提供者
///
/// 在有效期内复用内部提供者返回的令牌，过期后重新获取
pub struct CachedTokenProvider<P> {
    inner: P,
    ttl: Duration,
    cached: Arc<Mutex<Option<(String, Instant)>>>,
}

impl<P: TokenProvider> CachedTokenProvider<P> {
    /// 默认缓存 50 分钟（Graph 令牌一般 60 分钟过期）
    pub fn new(inner: P) -> Self {
        Self::with_ttl(inner, Duration::from_secs(50 * 60))
    }

    pub fn with_ttl(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// 清空缓存（例如收到 401 后强制刷新）
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[async_trait]
impl<P: TokenProvider> TokenProvider for CachedTokenProvider<P> {
    async fn get_token(&self) -> Result<String> {
        // 持锁获取，避免多个 worker 同时刷新
        let mut cached = self.cached.lock().await;
        if let Some((token, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(token.clone());
            }
            debug!("访问令牌已过期，重新获取");
        }

        let token = self
            .inner
            .get_token()
            .await
            .context("刷新访问令牌失败")?;
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn get_token(&self) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{}", n))
        }
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.get_token().await.unwrap(), "abc");

        let empty = StaticTokenProvider::new("");
        assert!(empty.get_token().await.is_err());
    }

    #[tokio::test]
    async fn test_cached_provider_reuses_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CachedTokenProvider::new(CountingProvider {
            calls: calls.clone(),
        });

        assert_eq!(provider.get_token().await.unwrap(), "token-0");
        assert_eq!(provider.get_token().await.unwrap(), "token-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        provider.invalidate().await;
        assert_eq!(provider.get_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_provider_expires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CachedTokenProvider::with_ttl(
            CountingProvider {
                calls: calls.clone(),
            },
            Duration::ZERO,
        );

        provider.get_token().await.unwrap();
        provider.get_token().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
