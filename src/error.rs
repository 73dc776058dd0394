// 上传引擎错误类型
//
// 错误分类：
// - 校验错误（空文件、路径不存在、不是文件夹）：致命，不重试
// - 传输错误（网络、超时、5xx）：分片级别按退避策略重试
// - 会话错误（未返回 uploadUrl、认证失败）：致命，尽力清理远端会话
// - 批量全部失败：升级为批量级别的致命错误

use crate::graph::HttpErrorKind;
use crate::uploader::FailedUpload;
use std::path::PathBuf;
use thiserror::Error;

/// 错误响应体嵌入错误信息时的最大长度
pub const MAX_ERROR_BODY_LEN: usize = 512;

pub type UploadResult<T> = Result<T, UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    /// 参数或本地文件校验失败
    #[error("校验失败: {0}")]
    Validation(String),

    /// 本地文件读写失败
    #[error("本地文件操作失败: {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 获取访问令牌失败
    #[error("获取访问令牌失败: {0}")]
    Auth(String),

    /// 网络层错误（连接失败、DNS 等）
    #[error("网络请求失败: {0}")]
    Transport(String),

    /// 请求超时
    #[error("请求超时: {0}")]
    Timeout(String),

    /// 非 2xx 响应
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 响应内容不符合协议（缺少 uploadUrl、JSON 解析失败等）
    #[error("响应格式错误: {0}")]
    Protocol(String),

    /// 分片重试耗尽，会话失败
    #[error("上传会话失败（已尝试 {attempts} 次）: {last_error}")]
    SessionFailed {
        attempts: u32,
        last_error: Box<UploadError>,
    },

    /// 上传被取消
    #[error("上传已取消")]
    Cancelled,

    /// 批量上传全部失败
    #[error("文件夹上传全部失败: {total} 个文件均未上传成功")]
    AllFailed {
        total: usize,
        failures: Vec<FailedUpload>,
    },

    /// 工作线程异常退出
    #[error("上传任务异常: {0}")]
    WorkerPanicked(String),
}

impl UploadError {
    pub fn validation(msg: impl Into<String>) -> Self {
        UploadError::Validation(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UploadError::Io {
            path: path.into(),
            source,
        }
    }

    /// 读取本地文件失败：文件不存在归为校验错误，其余保留为 IO 错误
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            UploadError::Validation(format!("本地路径不存在: {}", path.display()))
        } else {
            UploadError::io(path, source)
        }
    }

    /// 根据状态码和响应体构造 HTTP 错误（响应体截断）
    pub fn http(status: u16, body: &[u8]) -> Self {
        UploadError::Http {
            status,
            body: truncate_body(body),
        }
    }

    /// HTTP 状态码（非 HTTP 错误返回 None）
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Http { status, .. } => Some(*status),
            UploadError::SessionFailed { last_error, .. } => last_error.status(),
            _ => None,
        }
    }

    /// 是否可重试
    ///
    /// 分片上传时，网络错误、超时以及可重试的 HTTP 状态都会进入重试流程
    pub fn is_retriable(&self) -> bool {
        match self {
            UploadError::Transport(_) | UploadError::Timeout(_) => true,
            UploadError::Http { status, .. } => HttpErrorKind::from_status(*status).is_retriable(),
            UploadError::Protocol(_) => true,
            _ => false,
        }
    }
}

/// 截断响应体，避免把整页 HTML 塞进错误信息
pub fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }
    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body(b"short"), "short");

        let long = "x".repeat(MAX_ERROR_BODY_LEN + 100);
        let truncated = truncate_body(long.as_bytes());
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_LEN + 3);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_retriable_classification() {
        assert!(UploadError::Transport("connection reset".into()).is_retriable());
        assert!(UploadError::Timeout("chunk".into()).is_retriable());
        assert!(UploadError::http(503, b"unavailable").is_retriable());
        assert!(UploadError::http(429, b"throttled").is_retriable());

        assert!(!UploadError::http(403, b"forbidden").is_retriable());
        assert!(!UploadError::validation("empty file").is_retriable());
        assert!(!UploadError::Cancelled.is_retriable());
    }

    #[test]
    fn test_local_io_not_found_is_validation() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            UploadError::local_io("/tmp/a.txt", missing),
            UploadError::Validation(_)
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            UploadError::local_io("/tmp/a.txt", denied),
            UploadError::Io { .. }
        ));
    }

    #[test]
    fn test_status_through_session_failure() {
        let err = UploadError::SessionFailed {
            attempts: 3,
            last_error: Box::new(UploadError::http(500, b"boom")),
        };
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("3"));
    }
}
