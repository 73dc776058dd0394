// Graph 网盘 API 模块

pub mod client;
pub mod transport;
pub mod types;

pub use client::{normalize_remote_path, DriveClient};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::*;
