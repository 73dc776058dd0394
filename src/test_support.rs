// 测试辅助：可编程的 HTTP 传输层和内存版网盘

use crate::auth::StaticTokenProvider;
use crate::config::GraphConfig;
use crate::error::UploadResult;
use crate::graph::{DriveClient, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) const TEST_BASE_URL: &str = "https://graph.test/v1.0";
pub(crate) const TEST_DRIVE_URL: &str = "https://graph.test/v1.0/me/drive";
const UPLOAD_URL_PREFIX: &str = "https://upload.test/session/";

/// 记录下来的请求
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: HttpMethod,
    pub url: String,
    pub bearer: Option<String>,
    pub content_range: Option<String>,
    pub content_length: Option<String>,
    pub body_len: usize,
}

type Handler = Box<dyn Fn(&HttpRequest) -> UploadResult<HttpResponse> + Send + Sync>;

/// 按闭包应答并记录所有请求的传输层
pub(crate) struct MockTransport {
    handler: Handler,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> UploadResult<HttpResponse> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 所有请求都返回同一个响应
    pub fn always(status: u16, body: &str) -> Self {
        let body = body.as_bytes().to_vec();
        Self::new(move |_| Ok(HttpResponse::new(status, body.clone())))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> UploadResult<HttpResponse> {
        self.calls.lock().push(RecordedCall {
            method: request.method,
            url: request.url.clone(),
            bearer: request.bearer.clone(),
            content_range: request.header_value("Content-Range").map(str::to_string),
            content_length: request.header_value("Content-Length").map(str::to_string),
            body_len: request.body.as_ref().map(|b| b.len()).unwrap_or(0),
        });
        // 让出调度，模拟真实网络请求的挂起点
        tokio::task::yield_now().await;
        (self.handler)(&request)
    }
}

pub(crate) fn test_graph_config() -> GraphConfig {
    GraphConfig {
        base_url: TEST_BASE_URL.to_string(),
        ..Default::default()
    }
}

/// 基于 MockTransport 构造客户端
pub(crate) fn mock_client(transport: MockTransport) -> (DriveClient, Arc<MockTransport>) {
    let transport = Arc::new(transport);
    let client = DriveClient::new(
        &test_graph_config(),
        transport.clone(),
        Arc::new(StaticTokenProvider::new("test-token")),
    );
    (client, transport)
}

/// 内存版网盘
///
/// 模拟路径寻址查询、子文件夹创建（父目录必须存在）、单次上传和可续传会话
#[derive(Default)]
pub(crate) struct FakeDrive {
    folders: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, u64>>,
    /// upload_url -> (文件路径, 已接收字节)
    sessions: Mutex<HashMap<String, (String, u64)>>,
    failing_names: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
}

impl FakeDrive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 指定文件名的上传请求一律返回 500
    pub fn fail_uploads_of(&self, name: &str) {
        self.failing_names.lock().insert(name.to_string());
    }

    pub fn add_folder(&self, path: &str) {
        self.folders.lock().insert(path.to_string());
    }

    pub fn folder_exists(&self, path: &str) -> bool {
        self.folders.lock().contains(path)
    }

    pub fn file_size(&self, path: &str) -> Option<u64> {
        self.files.lock().get(path).copied()
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some((parent, _)) => self.folder_exists(parent),
            None => true,
        }
    }

    fn item_json(&self, path: &str, size: Option<u64>, folder: bool) -> Vec<u8> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = path.rsplit('/').next().unwrap_or("root");
        let mut item = json!({
            "id": format!("item-{}", id),
            "name": if path.is_empty() { "root" } else { name },
            "webUrl": format!("https://drive.test/{}", path),
        });
        if let Some(size) = size {
            item["size"] = json!(size);
        }
        if folder {
            item["folder"] = json!({ "childCount": 0 });
        } else {
            item["file"] = json!({});
        }
        serde_json::to_vec(&item).unwrap()
    }

    fn is_failing(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.failing_names.lock().contains(name)
    }

    pub fn handle(&self, req: &HttpRequest) -> UploadResult<HttpResponse> {
        if req.url.starts_with(UPLOAD_URL_PREFIX) {
            return Ok(self.handle_session(req));
        }

        let rest = req
            .url
            .strip_prefix(TEST_DRIVE_URL)
            .unwrap_or(&req.url)
            .to_string();
        let decode = |s: &str| urlencoding::decode(s).unwrap().into_owned();

        let response = match req.method {
            HttpMethod::Get if rest == "/root" => {
                HttpResponse::new(200, self.item_json("", None, true))
            }
            HttpMethod::Get => {
                let path = decode(rest.trim_start_matches("/root:/"));
                if self.folder_exists(&path) {
                    HttpResponse::new(200, self.item_json(&path, None, true))
                } else {
                    HttpResponse::new(404, r#"{"error":{"code":"itemNotFound"}}"#)
                }
            }
            HttpMethod::Post if rest.ends_with("children") => {
                let parent = if rest == "/root/children" {
                    String::new()
                } else {
                    decode(
                        rest.trim_start_matches("/root:/")
                            .trim_end_matches(":/children"),
                    )
                };
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_deref().unwrap_or_default()).unwrap();
                let name = body["name"].as_str().unwrap_or_default().to_string();
                let path = if parent.is_empty() {
                    name
                } else {
                    format!("{}/{}", parent, name)
                };

                if !parent.is_empty() && !self.folder_exists(&parent) {
                    HttpResponse::new(404, "parent missing")
                } else if !self.folders.lock().insert(path.clone()) {
                    HttpResponse::new(409, r#"{"error":{"code":"nameAlreadyExists"}}"#)
                } else {
                    HttpResponse::new(201, self.item_json(&path, None, true))
                }
            }
            HttpMethod::Put if rest.ends_with(":/content") => {
                let path = decode(
                    rest.trim_start_matches("/root:/")
                        .trim_end_matches(":/content"),
                );
                let size = req.body.as_ref().map(|b| b.len()).unwrap_or(0) as u64;
                if !self.parent_exists(&path) {
                    HttpResponse::new(404, "parent missing")
                } else if self.is_failing(&path) {
                    HttpResponse::new(500, "boom")
                } else {
                    self.files.lock().insert(path.clone(), size);
                    HttpResponse::new(201, self.item_json(&path, Some(size), false))
                }
            }
            HttpMethod::Post if rest.ends_with(":/createUploadSession") => {
                let path = decode(
                    rest.trim_start_matches("/root:/")
                        .trim_end_matches(":/createUploadSession"),
                );
                if !self.parent_exists(&path) {
                    HttpResponse::new(404, "parent missing")
                } else {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    let upload_url = format!("{}{}", UPLOAD_URL_PREFIX, id);
                    self.sessions
                        .lock()
                        .insert(upload_url.clone(), (path, 0));
                    HttpResponse::new(
                        200,
                        serde_json::to_vec(&json!({
                            "uploadUrl": upload_url,
                            "expirationDateTime": "2030-01-01T00:00:00Z",
                        }))
                        .unwrap(),
                    )
                }
            }
            _ => HttpResponse::new(400, "unsupported"),
        };
        Ok(response)
    }

    fn handle_session(&self, req: &HttpRequest) -> HttpResponse {
        if req.method == HttpMethod::Delete {
            self.sessions.lock().remove(&req.url);
            return HttpResponse::new(204, Vec::new());
        }

        let (path, received) = match self.sessions.lock().get(&req.url) {
            Some(entry) => entry.clone(),
            None => return HttpResponse::new(404, "session not found"),
        };
        if self.is_failing(&path) {
            return HttpResponse::new(500, "boom");
        }

        // bytes {start}-{end}/{total}
        let range = req.header_value("Content-Range").unwrap_or_default();
        let (span, total) = range
            .trim_start_matches("bytes ")
            .split_once('/')
            .unwrap();
        let (start, end) = span.split_once('-').unwrap();
        let (start, end, total): (u64, u64, u64) =
            (start.parse().unwrap(), end.parse().unwrap(), total.parse().unwrap());

        if start != received {
            return HttpResponse::new(416, "unexpected range");
        }
        let received = end + 1;
        if received == total {
            self.sessions.lock().remove(&req.url);
            self.files.lock().insert(path.clone(), total);
            HttpResponse::new(201, self.item_json(&path, Some(total), false))
        } else {
            self.sessions
                .lock()
                .insert(req.url.clone(), (path, received));
            HttpResponse::new(202, r#"{"nextExpectedRanges":[]}"#)
        }
    }
}

/// 连接到内存网盘的客户端
pub(crate) fn fake_drive_client() -> (DriveClient, Arc<MockTransport>, Arc<FakeDrive>) {
    fake_drive_client_with(|_| {})
}

/// 连接到内存网盘的客户端，每个请求交给网盘处理前先调用 hook
pub(crate) fn fake_drive_client_with<F>(hook: F) -> (DriveClient, Arc<MockTransport>, Arc<FakeDrive>)
where
    F: Fn(&HttpRequest) + Send + Sync + 'static,
{
    let drive = FakeDrive::new();
    let handler_drive = drive.clone();
    let (client, transport) = mock_client(MockTransport::new(move |req| {
        hook(req);
        handler_drive.handle(req)
    }));
    (client, transport, drive)
}

/// 在临时目录下写入指定大小的文件
pub(crate) fn write_file(dir: &std::path::Path, relative: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, content).unwrap();
    path
}
