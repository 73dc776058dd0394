// 上传分片管理
//
// Graph 可续传上传规则：
// - 分片大小必须是 320 KiB 的整数倍（最后一片除外）
// - 默认分片 10 × 320 KiB = 3200 KiB
// - 分片必须按顺序发送，Content-Range: bytes {start}-{end}/{total}

use crate::error::{UploadError, UploadResult};
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

/// 分片对齐单位: 320 KiB
pub const CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// 默认上传分片大小: 3200 KiB
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * CHUNK_ALIGNMENT;

/// 校验分片大小（非零且为 320 KiB 整数倍）
pub fn validate_chunk_size(chunk_size: u64) -> UploadResult<()> {
    if chunk_size == 0 || chunk_size % CHUNK_ALIGNMENT != 0 {
        return Err(UploadError::validation(format!(
            "分片大小必须是 320 KiB 的整数倍: {} bytes",
            chunk_size
        )));
    }
    Ok(())
}

/// 计算分片范围
///
/// 按 offset < total 循环，不会产生空分片
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<Range<u64>> {
    let mut chunks = Vec::new();
    if chunk_size == 0 {
        return chunks;
    }
    let mut offset = 0u64;

    while offset < total_size {
        let end = std::cmp::min(offset + chunk_size, total_size);
        chunks.push(offset..end);
        offset = end;
    }

    chunks
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 正在创建会话
    CreatingSession,
    /// 分片上传中
    UploadingChunk,
    /// 已完成
    Completed,
    /// 重试耗尽或致命错误
    Failed,
    /// 被取消
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// 可续传上传会话
///
/// 只由负责该文件的 worker 持有和修改，bytes_sent 单调递增
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// 服务器签发的上传地址
    pub upload_url: String,
    /// 文件总大小
    pub total_size: u64,
    /// 分片大小
    pub chunk_size: u64,
    /// 已确认发送的字节数
    bytes_sent: u64,
    /// 当前状态
    state: SessionState,
}

impl UploadSession {
    pub fn new(upload_url: String, total_size: u64, chunk_size: u64) -> Self {
        info!(
            "创建上传会话: 文件大小={} bytes, 分片大小={} bytes, 分片数量={}",
            total_size,
            chunk_size,
            total_size.div_ceil(chunk_size.max(1))
        );
        Self {
            upload_url,
            total_size,
            chunk_size,
            bytes_sent: 0,
            state: SessionState::UploadingChunk,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 下一个待发送分片，全部发送后返回 None
    pub fn next_range(&self) -> Option<Range<u64>> {
        if self.bytes_sent >= self.total_size {
            return None;
        }
        let end = std::cmp::min(self.bytes_sent + self.chunk_size, self.total_size);
        Some(self.bytes_sent..end)
    }

    /// 分片被服务器接收后推进偏移
    pub fn advance(&mut self, len: u64) {
        self.bytes_sent = self.bytes_sent.saturating_add(len).min(self.total_size);
    }

    /// 上传进度（百分比）
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        (self.bytes_sent as f64 / self.total_size as f64) * 100.0
    }

    /// 状态迁移，终态不再改变
    pub fn transition(&mut self, to: SessionState) {
        if self.state.is_terminal() {
            return;
        }
        debug!("上传会话状态: {:?} -> {:?}", self.state, to);
        self.state = to;
    }
}

/// 分片读取器
///
/// 文件句柄由处理该文件的 worker 独占
#[derive(Debug)]
pub struct ChunkReader {
    file: File,
    path: PathBuf,
}

impl ChunkReader {
    pub async fn open(path: &Path) -> UploadResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| UploadError::io(path, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// 读取分片数据（恰好 range 长度）
    pub async fn read_range(&mut self, range: &Range<u64>) -> UploadResult<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| UploadError::io(&self.path, e))?;

        let mut buffer = vec![0u8; (range.end - range.start) as usize];
        self.file
            .read_exact(&mut buffer)
            .await
            .map_err(|e| UploadError::io(&self.path, e))?;

        debug!(
            "读取分片: bytes={}-{}, 大小={} bytes",
            range.start,
            range.end - 1,
            buffer.len()
        );

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_validate_chunk_size() {
        assert!(validate_chunk_size(DEFAULT_CHUNK_SIZE).is_ok());
        assert!(validate_chunk_size(CHUNK_ALIGNMENT).is_ok());
        assert!(validate_chunk_size(0).is_err());
        assert!(validate_chunk_size(4 * MIB).is_err());
    }

    #[test]
    fn test_ten_mib_in_default_chunks() {
        let chunks = plan_chunks(10 * MIB, DEFAULT_CHUNK_SIZE);
        let sizes: Vec<u64> = chunks.iter().map(|r| r.end - r.start).collect();
        assert_eq!(sizes, vec![3200 * KIB, 3200 * KIB, 3200 * KIB, 640 * KIB]);
        assert_eq!(chunks[3], (9600 * KIB)..(10 * MIB));
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_chunk() {
        let chunks = plan_chunks(3 * DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|r| r.end > r.start));
        assert_eq!(chunks.last().unwrap().end, 3 * DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        assert!(plan_chunks(0, DEFAULT_CHUNK_SIZE).is_empty());
    }

    proptest! {
        #[test]
        fn prop_chunk_plan_covers_file(total in 0u64..(64 * MIB), units in 1u64..16) {
            let chunk_size = units * CHUNK_ALIGNMENT;
            let chunks = plan_chunks(total, chunk_size);

            prop_assert_eq!(chunks.len() as u64, total.div_ceil(chunk_size));
            prop_assert!(chunks.iter().all(|r| r.end > r.start && r.end - r.start <= chunk_size));
            prop_assert_eq!(chunks.iter().map(|r| r.end - r.start).sum::<u64>(), total);

            // 连续无重叠
            let mut expected_start = 0;
            for r in &chunks {
                prop_assert_eq!(r.start, expected_start);
                expected_start = r.end;
            }
        }
    }

    #[test]
    fn test_session_walks_plan() {
        let mut session = UploadSession::new("https://up/s".into(), 10 * MIB, DEFAULT_CHUNK_SIZE);
        let mut visited = Vec::new();
        while let Some(range) = session.next_range() {
            session.advance(range.end - range.start);
            visited.push(range);
        }
        assert_eq!(visited, plan_chunks(10 * MIB, DEFAULT_CHUNK_SIZE));
        assert_eq!(session.bytes_sent(), 10 * MIB);
        assert_eq!(session.progress(), 100.0);
    }

    #[test]
    fn test_session_advance_is_clamped() {
        let mut session = UploadSession::new("https://up/s".into(), 100, CHUNK_ALIGNMENT);
        session.advance(1000);
        assert_eq!(session.bytes_sent(), 100);
        assert!(session.next_range().is_none());
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut session = UploadSession::new("https://up/s".into(), 100, CHUNK_ALIGNMENT);
        assert_eq!(session.state(), SessionState::UploadingChunk);
        session.transition(SessionState::Failed);
        session.transition(SessionState::Completed);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_read_range() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        std::fs::write(&path, &content).unwrap();

        let mut reader = ChunkReader::open(&path).await.unwrap();
        let data = reader.read_range(&(100..300)).await.unwrap();
        assert_eq!(data, content[100..300]);

        // 越界读取报错
        assert!(reader.read_range(&(900..1100)).await.is_err());
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let err = ChunkReader::open(Path::new("/nonexistent/file.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));
    }
}
