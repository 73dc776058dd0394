// 文件夹上传编排
//
// upload_tree 流程：
// 1. 扫描本地目录（路径不存在或不是目录时直接报错，不触碰远端）
// 2. 确保远程根目录存在
// 3. 按深度顺序预建所有目标文件夹（串行，避免并发创建同一父目录）
// 4. min(max_workers, 文件数) 个 worker 从共享队列取任务并发上传
// 5. 按任务 ID 收齐全部结果，单个文件失败不影响其他文件
// 6. 全部失败时返回 AllFailed，否则返回汇总（含远程根目录元数据）

use crate::error::{UploadError, UploadResult};
use crate::graph::{normalize_remote_path, DriveClient, DriveItem};
use crate::uploader::{
    format_bytes, select_strategy, ChunkedSessionUploader, FolderCache, FolderScanner,
    RemoteFolderCreator, ScanOptions, SingleShotUploader, UploadOptions, UploadOutcome,
    UploadStrategy, UploadSummary, UploadTask,
};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// worker 共享的上传上下文
#[derive(Clone)]
pub struct UploadContext {
    client: DriveClient,
    options: UploadOptions,
    folders: RemoteFolderCreator,
    single: SingleShotUploader,
    chunked: ChunkedSessionUploader,
}

impl UploadContext {
    pub fn new(client: DriveClient, options: UploadOptions, cache: Arc<FolderCache>) -> Self {
        Self {
            folders: RemoteFolderCreator::new(client.clone(), cache),
            single: SingleShotUploader::new(client.clone()),
            chunked: ChunkedSessionUploader::new(client.clone(), &options),
            client,
            options,
        }
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn folder_cache(&self) -> &Arc<FolderCache> {
        self.folders.cache()
    }

    /// 按策略上传单个文件
    async fn upload_with_strategy(
        &self,
        strategy: UploadStrategy,
        local_path: &Path,
        remote_folder: &str,
        cancel: &CancellationToken,
    ) -> UploadResult<DriveItem> {
        match strategy {
            UploadStrategy::SingleShot => {
                if cancel.is_cancelled() {
                    return Err(UploadError::Cancelled);
                }
                self.single.upload(local_path, remote_folder).await
            }
            UploadStrategy::Chunked => {
                self.chunked
                    .upload_with_cancel(local_path, remote_folder, cancel)
                    .await
            }
        }
    }
}

/// 文件夹上传编排器
#[derive(Clone)]
pub struct DirectoryUploadOrchestrator {
    ctx: Arc<UploadContext>,
}

impl DirectoryUploadOrchestrator {
    /// 使用新的文件夹缓存创建
    pub fn new(client: DriveClient, options: UploadOptions) -> Self {
        Self::with_cache(client, options, Arc::new(FolderCache::new()))
    }

    /// 使用外部共享的文件夹缓存创建（多次上传之间复用）
    pub fn with_cache(client: DriveClient, options: UploadOptions, cache: Arc<FolderCache>) -> Self {
        Self {
            ctx: Arc::new(UploadContext::new(client, options, cache)),
        }
    }

    pub fn context(&self) -> &UploadContext {
        &self.ctx
    }

    pub fn folder_cache(&self) -> &Arc<FolderCache> {
        self.ctx.folder_cache()
    }

    /// 上传单个文件到远程文件夹（文件夹不存在时自动创建）
    pub async fn upload_file(&self, local_path: &Path, remote_folder: &str) -> UploadResult<DriveItem> {
        self.upload_file_with_cancel(local_path, remote_folder, &CancellationToken::new())
            .await
    }

    /// 可取消的单文件上传
    pub async fn upload_file_with_cancel(
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

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let remote_folder = normalize_remote_path(remote_folder);
        self.ctx.folders.ensure_folder(&remote_folder).await?;

        let strategy = select_strategy(metadata.len());
        info!(
            "上传文件: {} ({}), 策略={:?}",
            local_path.display(),
            format_bytes(metadata.len()),
            strategy
        );
        self.ctx
            .upload_with_strategy(strategy, local_path, &remote_folder, cancel)
            .await
    }

    /// 上传本地文件夹到 remote_parent/{文件夹名}
    pub async fn upload_folder(&self, local_dir: &Path, remote_parent: &str) -> UploadResult<UploadSummary> {
        self.upload_folder_with_cancel(local_dir, remote_parent, &CancellationToken::new())
            .await
    }

    /// 可取消的文件夹上传
    pub async fn upload_folder_with_cancel(
        &self,
        local_dir: &Path,
        remote_parent: &str,
        cancel: &CancellationToken,
    ) -> UploadResult<UploadSummary> {
        let dir_name = local_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                UploadError::validation(format!("无法获取文件夹名: {}", local_dir.display()))
            })?;
        let remote_root = join_remote(&normalize_remote_path(remote_parent), &dir_name);
        self.upload_tree_with_cancel(local_dir, &remote_root, cancel)
            .await
    }

    /// 上传本地目录树到 remote_root（本地根目录的内容直接放在 remote_root 下）
    pub async fn upload_tree(&self, local_root: &Path, remote_root: &str) -> UploadResult<UploadSummary> {
        self.upload_tree_with_cancel(local_root, remote_root, &CancellationToken::new())
            .await
    }

    /// 可取消的目录树上传
    ///
    /// 预建目录阶段取消直接返回 Cancelled；上传阶段取消后尚未开始的任务记为失败，
    /// 进行中的分片会话在分片边界停止
    pub async fn upload_tree_with_cancel(
        &self,
        local_root: &Path,
        remote_root: &str,
        cancel: &CancellationToken,
    ) -> UploadResult<UploadSummary> {
        let remote_root = normalize_remote_path(remote_root);
        let started = Instant::now();

        let scan = {
            let scanner = FolderScanner::with_options(ScanOptions {
                skip_hidden: self.ctx.options.skip_hidden,
                ..Default::default()
            });
            let root = local_root.to_path_buf();
            tokio::task::spawn_blocking(move || scanner.scan(root))
                .await
                .map_err(|e| UploadError::WorkerPanicked(format!("扫描任务异常: {}", e)))??
        };

        info!(
            "开始上传文件夹: {} -> {:?}, 共 {} 个文件 ({})",
            local_root.display(),
            remote_root,
            scan.files.len(),
            format_bytes(scan.total_size)
        );

        let targets = std::iter::once(remote_root.clone())
            .chain(scan.folders.iter().map(|relative| join_remote(&remote_root, relative)));
        for folder in targets {
            if cancel.is_cancelled() {
                warn!("预建远程文件夹时收到取消: {}", folder);
                return Err(UploadError::Cancelled);
            }
            self.ctx.folders.ensure_folder(&folder).await?;
        }
        debug!("远程文件夹预建完成: {} 个", scan.folders.len());

        let tasks: Vec<UploadTask> = scan
            .files
            .into_iter()
            .map(|file| {
                UploadTask::new(
                    file.local_path,
                    join_remote(&remote_root, &file.relative_folder),
                    file.size,
                )
            })
            .collect();

        let outcomes = self.run_pool(tasks, cancel).await;
        let mut summary = UploadSummary::from_outcomes(outcomes);

        if summary.total > 0 && summary.succeeded == 0 {
            error!("文件夹上传全部失败: {} 个文件", summary.total);
            return Err(UploadError::AllFailed {
                total: summary.total,
                failures: summary.failed_details,
            });
        }

        if summary.failed > 0 {
            warn!(
                "文件夹上传部分失败: 成功 {}, 失败 {}",
                summary.succeeded, summary.failed
            );
            for failure in &summary.failed_details {
                warn!("  ✗ {}: {}", failure.file_name, failure.error);
            }
        }

        summary.root = match self.ctx.client.get_item(&remote_root).await {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("获取远程根目录信息失败: {}", e);
                None
            }
        };

        info!(
            "✓ 文件夹上传完成: 成功 {}/{}, 耗时 {:.1}s",
            summary.succeeded,
            summary.total,
            started.elapsed().as_secs_f64()
        );

        Ok(summary)
    }

    /// 有界 worker 池执行任务，返回顺序与输入一致
    async fn run_pool(&self, tasks: Vec<UploadTask>, cancel: &CancellationToken) -> Vec<UploadOutcome> {
        let total = tasks.len();
        if total == 0 {
            info!("没有需要上传的文件");
            return Vec::new();
        }

        let worker_count = self.ctx.options.max_workers.min(total).max(1);
        info!("启动 {} 个上传 worker, 任务数 {}", worker_count, total);

        let queue = Arc::new(Mutex::new(tasks.iter().cloned().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel::<UploadOutcome>();
        let mut workers = JoinSet::new();

        for worker_id in 0..worker_count {
            let ctx = self.ctx.clone();
            let queue = queue.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                worker_loop(worker_id, ctx, queue, tx, cancel).await;
            });
        }
        drop(tx);

        let mut results: HashMap<String, UploadOutcome> = HashMap::with_capacity(total);
        while results.len() < total {
            match rx.recv().await {
                Some(outcome) => {
                    results.insert(outcome.task.id.clone(), outcome);
                }
                None => break,
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("上传 worker 异常退出: {}", e);
            }
        }

        tasks
            .into_iter()
            .map(|task| match results.remove(&task.id) {
                Some(outcome) => outcome,
                None => {
                    let strategy = task.strategy();
                    UploadOutcome::failed(
                        task,
                        strategy,
                        &UploadError::WorkerPanicked("任务未返回结果".to_string()),
                        0,
                    )
                }
            })
            .collect()
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<UploadContext>,
    queue: Arc<Mutex<VecDeque<UploadTask>>>,
    tx: mpsc::UnboundedSender<UploadOutcome>,
    cancel: CancellationToken,
) {
    debug!("[worker#{}] 启动", worker_id);
    loop {
        let task = queue.lock().pop_front();
        let Some(task) = task else {
            break;
        };

        let outcome = run_task(&ctx, task, &cancel).await;
        if tx.send(outcome).is_err() {
            break;
        }
    }
    debug!("[worker#{}] 队列为空，退出", worker_id);
}

/// 执行单个任务，错误和 panic 都转换为失败结果
async fn run_task(ctx: &UploadContext, task: UploadTask, cancel: &CancellationToken) -> UploadOutcome {
    let strategy = task.strategy();
    let started = Instant::now();
    let local_path: PathBuf = task.local_path.clone();
    let remote_folder = task.remote_folder.clone();

    let result = AssertUnwindSafe(ctx.upload_with_strategy(
        strategy,
        &local_path,
        &remote_folder,
        cancel,
    ))
    .catch_unwind()
    .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(item)) => {
            info!("✓ {} ({:?}, {}ms)", task.file_name(), strategy, elapsed_ms);
            UploadOutcome::succeeded(task, strategy, item, elapsed_ms)
        }
        Ok(Err(e)) => {
            warn!("✗ {} 上传失败: {}", task.file_name(), e);
            UploadOutcome::failed(task, strategy, &e, elapsed_ms)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("✗ {} 上传任务 panic: {}", task.file_name(), message);
            UploadOutcome::failed(task, strategy, &UploadError::WorkerPanicked(message), elapsed_ms)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

/// 拼接远程路径
fn join_remote(base: &str, relative: &str) -> String {
    normalize_remote_path(&format!("{}/{}", base, relative))
}
