// HTTP 传输层
//
// 所有 Graph 请求都经过 HttpTransport，便于在测试中替换为记录调用顺序的实现

use crate::error::{UploadError, UploadResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// 传输层请求
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// 请求体，重试时克隆只增加引用计数
    pub body: Option<Bytes>,
    /// Bearer 令牌，分片 PUT 不携带（uploadUrl 本身即授权）
    pub bearer: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            bearer: None,
            timeout,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn bearer(mut self, token: String) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// 序列化 JSON 请求体并设置 Content-Type
    pub fn json<T: serde::Serialize>(self, value: &T) -> UploadResult<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| UploadError::Protocol(format!("序列化请求体失败: {}", e)))?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    /// 获取请求头（忽略大小写）
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 传输层响应
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// 响应头，键统一为小写
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 解析 JSON 响应体
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> UploadResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            UploadError::Protocol(format!(
                "解析响应失败: status={}, error={}, body={}",
                self.status,
                e,
                crate::error::truncate_body(&self.body)
            ))
        })
    }

    /// 非 2xx 响应转换为错误
    pub fn error_for_status(self) -> UploadResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(UploadError::http(self.status, &self.body))
        }
    }
}

/// HTTP 传输抽象
///
/// 只负责把请求发出去并带回状态码、响应头和响应体；
/// 状态码语义由上层解释
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> UploadResult<HttpResponse>;
}

/// 基于 reqwest 的传输实现
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> UploadResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UploadError::Transport(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_headers(request: &HttpRequest) -> UploadResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| UploadError::validation(format!("非法请求头 {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| UploadError::validation(format!("非法请求头值: {}", e)))?;
            headers.insert(name, value);
        }
        if let Some(token) = &request.bearer {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| UploadError::Auth(format!("令牌包含非法字符: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

fn classify_reqwest_error(err: reqwest::Error, url: &str) -> UploadError {
    if err.is_timeout() {
        UploadError::Timeout(format!("{}: {}", url, err))
    } else {
        UploadError::Transport(format!("{}: {}", url, err))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> UploadResult<HttpResponse> {
        let headers = Self::build_headers(&request)?;

        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };
        let mut builder = builder.headers(headers).timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        debug!("{} {}", request.method, request.url);

        let response = builder
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, &request.url))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(e, &request.url))?
            .to_vec();

        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::new(HttpMethod::Put, "https://up.example/s", Duration::from_secs(120))
            .header("Content-Range", "bytes 0-9/100")
            .body(vec![0u8; 10]);

        assert_eq!(req.header_value("content-range"), Some("bytes 0-9/100"));
        assert!(req.bearer.is_none());
        assert_eq!(req.body.as_ref().map(Bytes::len), Some(10));
    }

    #[test]
    fn test_build_headers_with_bearer() {
        let req = HttpRequest::new(HttpMethod::Get, "https://g/x", Duration::from_secs(30))
            .bearer("abc".to_string());
        let headers = ReqwestTransport::build_headers(&req).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[test]
    fn test_error_for_status() {
        assert!(HttpResponse::new(202, Vec::new()).error_for_status().is_ok());

        let err = HttpResponse::new(404, b"itemNotFound".to_vec())
            .error_for_status()
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_method_display() {
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }
}
