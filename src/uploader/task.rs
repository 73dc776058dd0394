// 上传任务与结果汇总

use crate::error::UploadError;
use crate::graph::DriveItem;
use crate::uploader::{select_strategy, UploadStrategy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// 上传任务（一个本地文件对应一个任务）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTask {
    /// 任务ID
    pub id: String,
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 远程目标文件夹
    pub remote_folder: String,
    /// 文件大小
    pub size_bytes: u64,
}

impl UploadTask {
    pub fn new(local_path: PathBuf, remote_folder: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            local_path,
            remote_folder: remote_folder.into(),
            size_bytes,
        }
    }

    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn strategy(&self) -> UploadStrategy {
        select_strategy(self.size_bytes)
    }
}

/// 单个任务的执行结果
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub task: UploadTask,
    pub strategy: UploadStrategy,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 失败是否属于可重试类（供调用方决定是否重跑）
    pub retriable: bool,
    pub elapsed_ms: u64,
}

impl UploadOutcome {
    pub fn succeeded(task: UploadTask, strategy: UploadStrategy, item: DriveItem, elapsed_ms: u64) -> Self {
        Self {
            task,
            strategy,
            success: true,
            remote_item_id: Some(item.id).filter(|id| !id.is_empty()),
            web_url: item.web_url,
            error: None,
            retriable: false,
            elapsed_ms,
        }
    }

    pub fn failed(task: UploadTask, strategy: UploadStrategy, error: &UploadError, elapsed_ms: u64) -> Self {
        Self {
            task,
            strategy,
            success: false,
            remote_item_id: None,
            web_url: None,
            error: Some(error.to_string()),
            retriable: error.is_retriable(),
            elapsed_ms,
        }
    }
}

/// 失败文件明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUpload {
    pub file_name: String,
    pub local_path: PathBuf,
    pub error: String,
    pub retriable: bool,
}

impl From<&UploadOutcome> for FailedUpload {
    fn from(outcome: &UploadOutcome) -> Self {
        Self {
            file_name: outcome.task.file_name(),
            local_path: outcome.task.local_path.clone(),
            error: outcome.error.clone().unwrap_or_default(),
            retriable: outcome.retriable,
        }
    }
}

/// 文件夹上传汇总
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_details: Vec<FailedUpload>,
    pub outcomes: Vec<UploadOutcome>,
    /// 远程根文件夹元数据（获取失败时为空）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<DriveItem>,
}

impl UploadSummary {
    pub fn from_outcomes(outcomes: Vec<UploadOutcome>) -> Self {
        let failed_details: Vec<FailedUpload> = outcomes
            .iter()
            .filter(|o| !o.success)
            .map(FailedUpload::from)
            .collect();
        let total = outcomes.len();
        let failed = failed_details.len();

        Self {
            total,
            succeeded: total - failed,
            failed,
            failed_details,
            outcomes,
            root: None,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// 失败的任务（可用于重跑）
    pub fn failed_tasks(&self) -> Vec<&UploadTask> {
        self.outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| &o.task)
            .collect()
    }
}
