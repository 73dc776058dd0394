// Graph 网盘 API 数据类型

use serde::{Deserialize, Serialize};

/// 文件/文件夹元数据（driveItem）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    /// 条目ID
    #[serde(default)]
    pub id: String,

    /// 名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// 大小（字节）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// 网页访问地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,

    /// 文件夹标记（仅文件夹存在）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<serde_json::Value>,

    /// 文件标记（仅文件存在）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<serde_json::Value>,
}

impl DriveItem {
    /// 是否是文件夹
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }
}

/// 冲突处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictBehavior {
    /// 覆盖同名文件
    Replace,
    /// 同名时报错（409）
    Fail,
    /// 同名时自动重命名
    Rename,
}

/// createUploadSession 请求体
#[derive(Debug, Clone, Serialize)]
pub struct CreateUploadSessionRequest {
    pub item: UploadSessionItem,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSessionItem {
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    pub conflict_behavior: ConflictBehavior,
    pub name: String,
}

impl CreateUploadSessionRequest {
    /// 覆盖同名文件的上传会话
    pub fn replace(file_name: &str) -> Self {
        Self {
            item: UploadSessionItem {
                conflict_behavior: ConflictBehavior::Replace,
                name: file_name.to_string(),
            },
        }
    }
}

/// createUploadSession 响应
///
/// uploadUrl 缺失属于致命错误，由调用方检查
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionResponse {
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub expiration_date_time: Option<String>,
}

/// 创建子文件夹请求体
#[derive(Debug, Clone, Serialize)]
pub struct CreateFolderRequest {
    pub name: String,
    pub folder: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    pub conflict_behavior: ConflictBehavior,
}

impl CreateFolderRequest {
    /// 同名文件夹已存在时返回 409，由调用方视为成功
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            folder: serde_json::Map::new(),
            conflict_behavior: ConflictBehavior::Fail,
        }
    }
}

/// 创建文件夹结果
#[derive(Debug, Clone, PartialEq)]
pub enum FolderCreation {
    /// 本次请求创建成功
    Created(DriveItem),
    /// 文件夹已存在（并发创建或之前已存在）
    AlreadyExists,
}

/// 分片上传响应
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResponse {
    /// 202：分片已接收，继续上传
    Accepted,
    /// 200/201：服务器认为上传已完成
    Completed(DriveItem),
}

/// 分享链接
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingLink {
    #[serde(default, rename = "type")]
    pub link_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// createLink 请求体
#[derive(Debug, Clone, Serialize)]
pub struct CreateLinkRequest {
    #[serde(rename = "type")]
    pub link_type: String,
    pub scope: String,
}

/// createLink 响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLinkResponse {
    #[serde(default)]
    pub link: Option<SharingLink>,
}

/// 权限条目
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Permission {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub link: Option<SharingLink>,
}

/// 权限列表
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionList {
    #[serde(default)]
    pub value: Vec<Permission>,
}

/// HTTP 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// 请求超时（可重试）
    Timeout,
    /// 服务器错误（可重试）
    ServerError,
    /// 限流（可重试）
    RateLimited,
    /// 认证失败（不可重试）
    Unauthorized,
    /// 权限不足（不可重试）
    Forbidden,
    /// 资源不存在（不可重试）
    NotFound,
    /// 冲突，如同名文件夹已存在（不可重试）
    Conflict,
    /// 参数错误（不可重试）
    BadRequest,
    /// 空间不足（不可重试）
    QuotaExceeded,
    /// 上传会话过期或范围不匹配（不可重试）
    SessionExpired,
    /// 未知错误
    Unknown,
}

impl HttpErrorKind {
    /// 是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            HttpErrorKind::Timeout | HttpErrorKind::ServerError | HttpErrorKind::RateLimited
        )
    }

    /// 从 HTTP 状态码转换
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 504 => HttpErrorKind::Timeout,
            429 => HttpErrorKind::RateLimited,
            507 => HttpErrorKind::QuotaExceeded,
            500..=599 => HttpErrorKind::ServerError,
            401 => HttpErrorKind::Unauthorized,
            403 => HttpErrorKind::Forbidden,
            404 => HttpErrorKind::NotFound,
            409 => HttpErrorKind::Conflict,
            400 => HttpErrorKind::BadRequest,
            416 => HttpErrorKind::SessionExpired,
            _ => HttpErrorKind::Unknown,
        }
    }
}
