// 远程文件夹缓存
//
// 记录本进程内已确认存在的远程文件夹路径，跨 worker 共享。
// 只增不减，唯一的删除途径是 invalidate（外部删除了远端目录时调用）

use crate::graph::normalize_remote_path;
use dashmap::DashSet;
use tracing::debug;

/// 已确认存在的远程文件夹集合
#[derive(Debug, Default)]
pub struct FolderCache {
    entries: DashSet<String>,
}

impl FolderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains(&normalize_remote_path(path))
    }

    /// 记录已存在的文件夹，首次插入返回 true
    pub fn insert(&self, path: &str) -> bool {
        let path = normalize_remote_path(path);
        if path.is_empty() {
            return false;
        }
        self.entries.insert(path)
    }

    /// 移除该路径及其所有子路径，返回移除的条目数
    pub fn invalidate(&self, path: &str) -> usize {
        let path = normalize_remote_path(path);
        let before = self.entries.len();
        if path.is_empty() {
            self.entries.clear();
        } else {
            let prefix = format!("{}/", path);
            self.entries
                .retain(|entry| entry != &path && !entry.starts_with(&prefix));
        }
        let removed = before.saturating_sub(self.entries.len());
        debug!("文件夹缓存失效: path={:?}, 移除 {} 条", path, removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 当前缓存内容（排序后）
    pub fn snapshot(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_normalizes() {
        let cache = FolderCache::new();
        assert!(cache.insert("/A/B/"));
        assert!(!cache.insert("A/B"));
        assert!(cache.contains("A/B"));
        assert!(cache.contains("/A/B"));
        assert!(!cache.insert("/"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = FolderCache::new();
        for path in ["A", "A/B", "A/B/C", "AB", "X"] {
            cache.insert(path);
        }

        assert_eq!(cache.invalidate("A/B"), 2);
        assert_eq!(cache.snapshot(), vec!["A", "AB", "X"]);

        // 兄弟前缀 "AB" 不受影响
        assert_eq!(cache.invalidate("A"), 1);
        assert_eq!(cache.snapshot(), vec!["AB", "X"]);

        assert_eq!(cache.invalidate(""), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_insert() {
        let cache = Arc::new(FolderCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| cache.insert(&format!("dir/{}", i)))
                        .count()
                })
            })
            .collect();

        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 100);
        assert_eq!(cache.len(), 100);
    }
}
