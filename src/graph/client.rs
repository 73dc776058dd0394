// Graph 网盘客户端
//
// 封装上传引擎用到的 driveItem 接口：
// - 路径寻址的元数据查询 / 子文件夹创建
// - 单次 PUT 上传
// - 可续传上传会话（创建 / 分片 PUT / 取消）
// - 分享链接

use crate::auth::TokenProvider;
use crate::config::GraphConfig;
use crate::error::{UploadError, UploadResult};
use crate::graph::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::graph::types::{
    ChunkResponse, CreateFolderRequest, CreateLinkRequest, CreateLinkResponse,
    CreateUploadSessionRequest, DriveItem, FolderCreation, PermissionList, SharingLink,
    UploadSessionResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Graph 网盘客户端
#[derive(Clone)]
pub struct DriveClient {
    /// HTTP 传输层
    transport: Arc<dyn HttpTransport>,
    /// 令牌提供者
    tokens: Arc<dyn TokenProvider>,
    /// 网盘根地址，如 https://graph.microsoft.com/v1.0/users/{id}/drive
    drive_url: String,
    /// 元数据类请求超时（查询、建文件夹、创建会话）
    metadata_timeout: Duration,
    /// 分片 PUT 超时
    chunk_timeout: Duration,
}

impl DriveClient {
    /// 创建客户端
    pub fn new(
        config: &GraphConfig,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let drive_url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.drive_path()
        );
        info!("初始化网盘客户端: {}", drive_url);
        Self {
            transport,
            tokens,
            drive_url,
            metadata_timeout: Duration::from_secs(config.metadata_timeout_secs),
            chunk_timeout: Duration::from_secs(config.chunk_timeout_secs),
        }
    }

    pub fn drive_url(&self) -> &str {
        &self.drive_url
    }

    async fn bearer(&self) -> UploadResult<String> {
        self.tokens
            .get_token()
            .await
            .map_err(|e| UploadError::Auth(format!("{:#}", e)))
    }

    /// 发送带令牌的请求
    async fn send_authorized(&self, request: HttpRequest) -> UploadResult<crate::graph::HttpResponse> {
        let token = self.bearer().await?;
        self.transport.send(request.bearer(token)).await
    }

    /// 路径寻址 URL：root 或 root:/a/b
    pub fn item_url(&self, path: &str) -> String {
        let encoded = encode_path(path);
        if encoded.is_empty() {
            format!("{}/root", self.drive_url)
        } else {
            format!("{}/root:/{}", self.drive_url, encoded)
        }
    }

    /// 子项集合 URL：root/children 或 root:/a/b:/children
    pub fn children_url(&self, parent: &str) -> String {
        let encoded = encode_path(parent);
        if encoded.is_empty() {
            format!("{}/root/children", self.drive_url)
        } else {
            format!("{}/root:/{}:/children", self.drive_url, encoded)
        }
    }

    /// 文件子路径动作 URL：root:/a/b/name:/content
    fn file_action_url(&self, folder: &str, file_name: &str, action: &str) -> String {
        let folder = normalize_remote_path(folder);
        let full = if folder.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", folder, file_name)
        };
        format!("{}/root:/{}:/{}", self.drive_url, encode_path(&full), action)
    }

    /// 按路径查询条目元数据
    pub async fn get_item(&self, path: &str) -> UploadResult<DriveItem> {
        let url = self.item_url(path);
        debug!("查询条目: {}", url);
        let request = HttpRequest::new(HttpMethod::Get, url, self.metadata_timeout);
        self.send_authorized(request)
            .await?
            .error_for_status()?
            .json()
    }

    /// 在父路径下创建文件夹
    ///
    /// 同名文件夹已存在（409）视为成功，返回 AlreadyExists
    pub async fn create_folder(&self, parent: &str, name: &str) -> UploadResult<FolderCreation> {
        let url = self.children_url(parent);
        info!("创建文件夹: parent={:?}, name={}", parent, name);
        let request = HttpRequest::new(HttpMethod::Post, url, self.metadata_timeout)
            .json(&CreateFolderRequest::new(name))?;

        let response = self.send_authorized(request).await?;
        if response.status == 409 {
            debug!("文件夹已存在: parent={:?}, name={}", parent, name);
            return Ok(FolderCreation::AlreadyExists);
        }
        let item: DriveItem = response.error_for_status()?.json()?;
        Ok(FolderCreation::Created(item))
    }

    /// 单次 PUT 上传文件内容
    pub async fn upload_content(
        &self,
        folder: &str,
        file_name: &str,
        data: Vec<u8>,
        content_type: &str,
        timeout: Duration,
    ) -> UploadResult<DriveItem> {
        let url = self.file_action_url(folder, file_name, "content");
        let request = HttpRequest::new(HttpMethod::Put, url, timeout)
            .header("Content-Type", content_type)
            .body(data);
        self.send_authorized(request)
            .await?
            .error_for_status()?
            .json()
    }

    /// 创建可续传上传会话，返回 uploadUrl
    pub async fn create_upload_session(&self, folder: &str, file_name: &str) -> UploadResult<String> {
        let url = self.file_action_url(folder, file_name, "createUploadSession");
        let request = HttpRequest::new(HttpMethod::Post, url, self.metadata_timeout)
            .json(&CreateUploadSessionRequest::replace(file_name))?;

        let session: UploadSessionResponse =
            self.send_authorized(request).await?.error_for_status()?.json()?;

        match session.upload_url {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(UploadError::Protocol(format!(
                "创建上传会话未返回 uploadUrl: {}",
                file_name
            ))),
        }
    }

    /// 上传一个字节范围
    ///
    /// 不携带 Authorization：uploadUrl 本身即授权
    pub async fn upload_range(
        &self,
        upload_url: &str,
        data: impl Into<Bytes>,
        range_start: u64,
        total_size: u64,
    ) -> UploadResult<ChunkResponse> {
        let data = data.into();
        let len = data.len() as u64;
        if len == 0 {
            return Err(UploadError::validation("不允许上传空分片"));
        }
        let range_end = range_start + len - 1;
        let content_range = format!("bytes {}-{}/{}", range_start, range_end, total_size);
        debug!("PUT 分片: {}", content_range);

        let request = HttpRequest::new(HttpMethod::Put, upload_url, self.chunk_timeout)
            .header("Content-Length", len.to_string())
            .header("Content-Range", content_range)
            .body(data);

        let response = self.transport.send(request).await?;
        match response.status {
            200 | 201 => {
                let item: DriveItem = response.json()?;
                Ok(ChunkResponse::Completed(item))
            }
            202 => Ok(ChunkResponse::Accepted),
            _ => Err(UploadError::http(response.status, &response.body)),
        }
    }

    /// 取消上传会话（DELETE uploadUrl）
    pub async fn delete_upload_session(&self, upload_url: &str) -> UploadResult<()> {
        let request = HttpRequest::new(HttpMethod::Delete, upload_url, self.metadata_timeout);
        self.send_authorized(request).await?.error_for_status()?;
        Ok(())
    }

    /// 为条目创建分享链接
    pub async fn create_share_link(
        &self,
        item_id: &str,
        link_type: &str,
        scope: &str,
    ) -> UploadResult<SharingLink> {
        let url = format!(
            "{}/items/{}/createLink",
            self.drive_url,
            urlencoding::encode(item_id)
        );
        info!("创建分享链接: item={}, type={}, scope={}", item_id, link_type, scope);
        let request = HttpRequest::new(HttpMethod::Post, url, self.metadata_timeout).json(
            &CreateLinkRequest {
                link_type: link_type.to_string(),
                scope: scope.to_string(),
            },
        )?;

        let response: CreateLinkResponse =
            self.send_authorized(request).await?.error_for_status()?.json()?;
        let link = response.link.unwrap_or_default();
        if link.web_url.is_none() {
            warn!("分享链接响应缺少 webUrl: item={}", item_id);
        }
        Ok(link)
    }

    /// 查找条目已有的分享链接
    pub async fn find_share_link(&self, item_id: &str) -> UploadResult<Option<String>> {
        let url = format!(
            "{}/items/{}/permissions",
            self.drive_url,
            urlencoding::encode(item_id)
        );
        let request = HttpRequest::new(HttpMethod::Get, url, self.metadata_timeout);
        let permissions: PermissionList =
            self.send_authorized(request).await?.error_for_status()?.json()?;

        Ok(permissions
            .value
            .into_iter()
            .filter_map(|p| p.link.and_then(|l| l.web_url))
            .next())
    }
}

/// 规范化远程路径：统一分隔符，去掉首尾斜杠和空段
pub fn normalize_remote_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// 逐段 URL 编码
fn encode_path(path: &str) -> String {
    normalize_remote_path(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
