use std::num::NonZeroUsize;
use std::time::SystemTime;

use bytes::Bytes;
use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    content: Bytes,
    modified_time: SystemTime,
}

/// 照片内容的 LRU 缓存，以物品 id 为键，以照片文件的修改时间判断是否过期
pub struct PhotoCache {
    cache: LruCache<String, CacheEntry>,
}

impl PhotoCache {
    // 根据容量构造，0 按 1 处理
    pub fn from_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }
    // 放入
    pub fn push(&mut self, id: &str, bytes: Bytes, modified_time: SystemTime) {
        let entry = CacheEntry {
            content: bytes,
            modified_time,
        };
        self.cache.put(id.to_string(), entry);
    }

    // 查询有效缓存
    pub fn find(&mut self, id: &str, current_modified_time: SystemTime) -> Option<Bytes> {
        match self.cache.get(id) {
            Some(entry) if entry.modified_time == current_modified_time => {
                Some(entry.content.clone())
            }
            _ => None,
        }
    }

    // 照片被替换或删除时调用
    pub fn invalidate(&mut self, id: &str) {
        self.cache.pop(id);
    }

    // 测试
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.len()
    }
}
