// 可续传会话上传引擎
//
// 流程：
// 1. 校验本地文件（存在、非空）
// 2. 创建上传会话，拿到 uploadUrl
// 3. 按顺序 PUT 分片，202 继续，200/201 完成
// 4. 单分片失败按线性退避重试，耗尽后会话失败
// 5. 失败或取消时尽力 DELETE uploadUrl，清理失败只记日志

use crate::error::{UploadError, UploadResult};
use crate::graph::{ChunkResponse, DriveClient, DriveItem};
use crate::uploader::chunk::{ChunkReader, SessionState, UploadSession};
use crate::uploader::{file_name_of, format_bytes, RetryPolicy, UploadOptions};
use bytes::Bytes;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct ChunkedSessionUploader {
    client: DriveClient,
    chunk_size: u64,
    retry: RetryPolicy,
}

impl ChunkedSessionUploader {
    pub fn new(client: DriveClient, options: &UploadOptions) -> Self {
        Self {
            client,
            chunk_size: options.chunk_size,
            retry: options.retry,
        }
    }

    /// 上传文件（不可取消）
    pub async fn upload(&self, local_path: &Path, remote_folder: &str) -> UploadResult<DriveItem> {
        self.upload_with_cancel(local_path, remote_folder, &CancellationToken::new())
            .await
    }

    /// 上传文件，取消令牌触发后在下一个分片边界停止并清理会话
    pub async fn upload_with_cancel(
        &self,
        local_path: &Path,
        remote_folder: &str,
        cancel: &CancellationToken,
    ) -> UploadResult<DriveItem> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| UploadError::local_io(local_path, e))?;
        if !metadata.is_file() {
            return Err(UploadError::validation(format!(
                "不是普通文件: {}",
                local_path.display()
            )));
        }
        let total_size = metadata.len();
        if total_size == 0 {
            return Err(UploadError::validation(format!(
                "空文件无法使用分片上传: {}",
                local_path.display()
            )));
        }
        let file_name = file_name_of(local_path)?;

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let mut reader = ChunkReader::open(local_path).await?;

        info!(
            "开始分片上传: {} -> {}/{} ({}), 状态={:?}",
            local_path.display(),
            remote_folder,
            file_name,
            format_bytes(total_size),
            SessionState::CreatingSession
        );
        let upload_url = self
            .client
            .create_upload_session(remote_folder, &file_name)
            .await?;

        let mut session = UploadSession::new(upload_url, total_size, self.chunk_size);

        match self.drive_chunks(&mut session, &mut reader, cancel).await {
            Ok(item) => {
                session.transition(SessionState::Completed);
                info!("✓ 分片上传完成: {} (id={})", file_name, item.id);
                Ok(item)
            }
            Err(UploadError::Cancelled) => {
                session.transition(SessionState::Cancelled);
                warn!(
                    "分片上传已取消: {}, 已发送 {}/{}",
                    file_name,
                    session.bytes_sent(),
                    session.total_size
                );
                self.cancel_session(&session).await;
                Err(UploadError::Cancelled)
            }
            Err(e) => {
                session.transition(SessionState::Failed);
                error!("分片上传失败: {}, 错误: {}", file_name, e);
                self.cancel_session(&session).await;
                Err(e)
            }
        }
    }

    /// 尽力删除远端会话，失败只记日志
    pub async fn cancel_session(&self, session: &UploadSession) {
        match self.client.delete_upload_session(&session.upload_url).await {
            Ok(()) => info!("已清理上传会话"),
            Err(e) => warn!("清理上传会话失败（忽略）: {}", e),
        }
    }

    async fn drive_chunks(
        &self,
        session: &mut UploadSession,
        reader: &mut ChunkReader,
        cancel: &CancellationToken,
    ) -> UploadResult<DriveItem> {
        while let Some(range) = session.next_range() {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let data = Bytes::from(reader.read_range(&range).await?);
            let response = self
                .put_chunk_with_retry(session, range.start, data, cancel)
                .await?;
            session.advance(range.end - range.start);

            debug!(
                "分片已接收: bytes {}-{}/{}, 进度 {:.1}%",
                range.start,
                range.end - 1,
                session.total_size,
                session.progress()
            );

            if let ChunkResponse::Completed(item) = response {
                if session.bytes_sent() < session.total_size {
                    warn!(
                        "服务器提前确认上传完成: 已发送 {}/{}",
                        session.bytes_sent(),
                        session.total_size
                    );
                }
                return Ok(item);
            }
        }

        Err(UploadError::Protocol(
            "所有分片已上传，但服务器未返回文件元数据".to_string(),
        ))
    }

    async fn put_chunk_with_retry(
        &self,
        session: &UploadSession,
        range_start: u64,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> UploadResult<ChunkResponse> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            match self
                .client
                .upload_range(&session.upload_url, data.clone(), range_start, session.total_size)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt < max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            "分片 offset={} 第 {}/{} 次上传失败，{:?} 后重试: {}",
                            range_start, attempt, max_attempts, delay, e
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        error!(
                            "分片 offset={} 重试 {} 次后仍然失败: {}",
                            range_start, max_attempts, e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(UploadError::SessionFailed {
            attempts: max_attempts,
            last_error: Box::new(
                last_error.unwrap_or_else(|| UploadError::Protocol("分片未发送".to_string())),
            ),
        })
    }
}
