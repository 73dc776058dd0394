//! 本地文件夹扫描
//!
//! 负责:
//! - 递归扫描本地文件夹（walkdir）
//! - 保留目录结构，收集需要在远端预建的相对目录
//! - 为批量上传提供文件列表

use crate::error::{UploadError, UploadResult};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use super::format_bytes;

/// 文件扫描结果
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 相对于扫描根目录的路径
    pub relative_path: PathBuf,
    /// 所在目录的相对路径（'/' 分隔，根目录为空串）
    pub relative_folder: String,
    /// 文件大小（字节）
    pub size: u64,
}

/// 文件夹扫描配置
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 是否跟随符号链接
    pub follow_symlinks: bool,
    /// 跳过隐藏文件（以.开头的文件和文件夹）
    pub skip_hidden: bool,
}

/// 扫描结果
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// 所有文件，按相对路径排序
    pub files: Vec<ScannedFile>,
    /// 文件所在的相对目录及其祖先目录，按深度升序
    pub folders: Vec<String>,
    /// 文件总大小
    pub total_size: u64,
}

/// 文件夹扫描器
#[derive(Debug, Clone, Default)]
pub struct FolderScanner {
    options: ScanOptions,
}

impl FolderScanner {
    /// 创建默认配置的扫描器
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建自定义配置的扫描器
    pub fn with_options(options: ScanOptions) -> Self {
        Self { options }
    }

    /// 递归扫描文件夹
    ///
    /// 路径不存在或不是文件夹时返回校验错误
    pub fn scan<P: AsRef<Path>>(&self, root_path: P) -> UploadResult<ScanResult> {
        let root_path = root_path.as_ref();

        if !root_path.exists() {
            return Err(UploadError::validation(format!(
                "本地路径不存在: {}",
                root_path.display()
            )));
        }

        if !root_path.is_dir() {
            return Err(UploadError::validation(format!(
                "本地路径不是文件夹: {}",
                root_path.display()
            )));
        }

        info!("开始扫描文件夹: {}", root_path.display());

        let skip_hidden = self.options.skip_hidden;
        let walker = WalkDir::new(root_path)
            .follow_links(self.options.follow_symlinks)
            .min_depth(1)
            .into_iter()
            .filter_entry(move |entry| !(skip_hidden && entry.depth() > 0 && is_hidden(entry)));

        let mut result = ScanResult::default();
        let mut folders = BTreeSet::new();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root_path.to_path_buf());
                UploadError::io(path, e.into())
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = entry
                .metadata()
                .map_err(|e| UploadError::io(entry.path(), e.into()))?;
            let relative_path = entry
                .path()
                .strip_prefix(root_path)
                .map(Path::to_path_buf)
                .map_err(|_| {
                    UploadError::validation(format!(
                        "无法计算相对路径: {}",
                        entry.path().display()
                    ))
                })?;

            let relative_folder = relative_path
                .parent()
                .map(to_remote_path)
                .unwrap_or_default();

            // 记录所在目录及全部祖先目录
            let mut ancestor = String::new();
            for segment in relative_folder.split('/').filter(|s| !s.is_empty()) {
                if !ancestor.is_empty() {
                    ancestor.push('/');
                }
                ancestor.push_str(segment);
                folders.insert(ancestor.clone());
            }

            debug!(
                "扫描到文件: {} ({})",
                relative_path.display(),
                format_bytes(metadata.len())
            );

            result.total_size += metadata.len();
            result.files.push(ScannedFile {
                local_path: entry.path().to_path_buf(),
                relative_path,
                relative_folder,
                size: metadata.len(),
            });
        }

        result
            .files
            .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        result.folders = folders.into_iter().collect();
        result
            .folders
            .sort_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));

        info!(
            "扫描完成: {} 个文件, {} 个目录, 总大小 {}",
            result.files.len(),
            result.folders.len(),
            format_bytes(result.total_size)
        );

        Ok(result)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// 本地相对路径转为 '/' 分隔的远程路径
fn to_remote_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
