// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 物品存储模块
//!
//! 基于文件系统的物品仓库。每个物品是一个聚合，由两个存储侧面组成：
//! - 记录侧面：`<items_dir>/<id>.json`，保存 id、名称与描述；
//! - 照片侧面：`<items_dir>/<id>.jpg`，可选的二进制内容。
//!
//! 两个侧面只通过 id 关联，创建与删除在聚合层面按固定顺序完成：
//! 创建时先写记录再写照片，删除时先删记录再删照片。
//! 两次写操作之间崩溃会留下「有记录、无照片」的物品，这是可接受的状态；
//! 删除时在两步之间崩溃会留下一张孤立照片，它无法通过任何接口访问。
//!
//! 照片 URL 不会被持久化，而是在读取时由服务地址和 id 拼接得到。

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use bytes::Bytes;
use log::{debug, error, warn};
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{cache::PhotoCache, exception::Exception};

const RECORD_EXT: &str = "json";
const PHOTO_EXT: &str = "jpg";

/// 持久化的物品记录
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 对外返回的物品表示，附带计算得到的照片 URL
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub photo: String,
}

/// 部分更新：只有 `Some` 的字段会被写入
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Item {
    /// 生成带照片 URL 的视图。URL 只由地址和 id 决定，不保证照片确实存在。
    pub fn view(&self, base_url: &str) -> ItemView {
        ItemView {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            photo: photo_url(base_url, &self.id),
        }
    }
}

pub fn photo_url(base_url: &str, id: &str) -> String {
    format!("{}/inventory/{}/photo", base_url, id)
}

/// 文件系统上的物品仓库
pub struct ItemStore {
    items_dir: PathBuf,
    photos: Mutex<PhotoCache>,
}

impl ItemStore {
    /// 打开（必要时创建）物品目录
    pub fn open(items_dir: &Path, photo_cache_size: usize) -> Result<Self, Exception> {
        if let Err(e) = fs::create_dir_all(items_dir) {
            error!("无法创建物品目录{}：{}", items_dir.display(), e);
            return Err(Exception::StorageFailed);
        }
        Ok(Self {
            items_dir: items_dir.to_path_buf(),
            photos: Mutex::new(PhotoCache::from_capacity(photo_cache_size)),
        })
    }

    pub fn items_dir(&self) -> &Path {
        &self.items_dir
    }

    /// 创建物品。名称去掉首尾空白后不能为空。
    ///
    /// 记录写入成功后才写照片，因此读者不会看到没有记录的照片。
    pub fn create(
        &self,
        name: &str,
        description: &str,
        photo: Option<&[u8]>,
    ) -> Result<Item, Exception> {
        let name = name.trim();
        if name.is_empty() {
            debug!("物品名称为空，拒绝创建");
            return Err(Exception::ValidationFailed);
        }
        let item = Item {
            id: new_id(),
            name: name.to_string(),
            description: description.to_string(),
        };
        self.write_record(&item)?;
        if let Some(bytes) = photo {
            self.write_photo(&item.id, bytes)?;
        }
        debug!("已创建物品{}（照片：{}）", item.id, photo.is_some());
        Ok(item)
    }

    /// 读取物品记录。记录不存在或无法解析时都视为不存在。
    pub fn get(&self, id: &str) -> Result<Item, Exception> {
        if !is_valid_id(id) {
            return Err(Exception::ItemNotFound);
        }
        read_record(&self.record_path(id)).ok_or(Exception::ItemNotFound)
    }

    pub fn exists(&self, id: &str) -> bool {
        is_valid_id(id) && self.record_path(id).is_file()
    }

    /// 部分更新，未提供的字段保持原值
    pub fn update(&self, id: &str, patch: ItemPatch) -> Result<Item, Exception> {
        let mut item = self.get(id)?;
        if let Some(name) = patch.name {
            item.name = name;
        }
        if let Some(description) = patch.description {
            item.description = description;
        }
        self.write_record(&item)?;
        Ok(item)
    }

    /// 删除记录和照片，返回记录此前是否存在。
    pub fn delete(&self, id: &str) -> Result<bool, Exception> {
        if !is_valid_id(id) {
            return Ok(false);
        }
        let existed = remove_if_present(&self.record_path(id))?;
        remove_if_present(&self.photo_path(id))?;
        self.photo_cache().invalidate(id);
        debug!("删除物品{}，记录存在：{}", id, existed);
        Ok(existed)
    }

    /// 列出所有可解析的记录，按 id 排序（即创建顺序）。损坏的记录文件被跳过。
    pub fn list(&self) -> Vec<Item> {
        let entries = match fs::read_dir(&self.items_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("无法读取物品目录{}：{}", self.items_dir.display(), e);
                return Vec::new();
            }
        };
        let mut items: Vec<Item> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == RECORD_EXT))
            .filter_map(|path| read_record(&path))
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// 替换照片，物品必须已经存在
    pub fn set_photo(&self, id: &str, bytes: &[u8]) -> Result<(), Exception> {
        if !self.exists(id) {
            return Err(Exception::ItemNotFound);
        }
        self.write_photo(id, bytes)
    }

    /// 读取照片。物品不存在返回 `ItemNotFound`，没有照片返回 `PhotoNotFound`。
    pub fn get_photo(&self, id: &str) -> Result<Bytes, Exception> {
        if !self.exists(id) {
            return Err(Exception::ItemNotFound);
        }
        let path = self.photo_path(id);
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(time) => time,
            Err(_) => return Err(Exception::PhotoNotFound),
        };

        let mut cache = self.photo_cache();
        if let Some(bytes) = cache.find(id, modified) {
            debug!("照片缓存命中：{}", id);
            return Ok(bytes);
        }
        match fs::read(&path) {
            Ok(content) => {
                let bytes = Bytes::from(content);
                cache.push(id, bytes.clone(), modified);
                Ok(bytes)
            }
            Err(e) => {
                warn!("无法读取照片{}：{}", path.display(), e);
                Err(Exception::PhotoNotFound)
            }
        }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.items_dir.join(format!("{}.{}", id, RECORD_EXT))
    }

    fn photo_path(&self, id: &str) -> PathBuf {
        self.items_dir.join(format!("{}.{}", id, PHOTO_EXT))
    }

    fn photo_cache(&self) -> MutexGuard<'_, PhotoCache> {
        match self.photos.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("照片缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    /// 先写临时文件再改名，读者看不到写了一半的记录
    fn write_record(&self, item: &Item) -> Result<(), Exception> {
        let json = match serde_json::to_vec_pretty(item) {
            Ok(json) => json,
            Err(e) => {
                error!("无法序列化物品{}：{}", item.id, e);
                return Err(Exception::StorageFailed);
            }
        };
        let path = self.record_path(&item.id);
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, &path)) {
            error!("写入物品记录{}失败：{}", path.display(), e);
            let _ = fs::remove_file(&tmp);
            return Err(Exception::StorageFailed);
        }
        Ok(())
    }

    fn write_photo(&self, id: &str, bytes: &[u8]) -> Result<(), Exception> {
        let path = self.photo_path(id);
        if let Err(e) = fs::write(&path, bytes) {
            error!("写入照片{}失败：{}", path.display(), e);
            return Err(Exception::StorageFailed);
        }
        self.photo_cache().invalidate(id);
        debug!("照片已写入：{}（{} bytes）", id, bytes.len());
        Ok(())
    }
}

/// 时间有序的唯一 id（UUIDv7：毫秒时间戳前缀 + 随机后缀）
fn new_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// 来自路径的 id 只能是单个文件名片段
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}

fn read_record(path: &Path) -> Option<Item> {
    let content = fs::read(path).ok()?;
    match serde_json::from_slice(&content) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!("跳过无法解析的物品记录{}：{}", path.display(), e);
            None
        }
    }
}

fn remove_if_present(path: &Path) -> Result<bool, Exception> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => {
            error!("删除文件{}失败：{}", path.display(), e);
            Err(Exception::StorageFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BASE: &str = "http://127.0.0.1:7878";

    fn open_store() -> (TempDir, ItemStore) {
        let dir = TempDir::new().unwrap();
        let store = ItemStore::open(&dir.path().join("items"), 4).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_then_get() {
        let (_dir, store) = open_store();
        let item = store.create("  Widget ", "Blue", None).unwrap();

        assert_eq!(item.name, "Widget");
        let fetched = store.get(&item.id).unwrap();
        assert_eq!(fetched, item);

        let view = fetched.view(BASE);
        assert_eq!(view.description, "Blue");
        assert!(view.photo.contains(&item.id));
        assert_eq!(view.photo, format!("{}/inventory/{}/photo", BASE, item.id));
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let (_dir, store) = open_store();
        assert_eq!(store.create("   ", "x", None).unwrap_err(), Exception::ValidationFailed);
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let (_dir, store) = open_store();
        let a = store.create("a", "", None).unwrap();
        let b = store.create("b", "", None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_record_does_not_persist_photo_url() {
        let (_dir, store) = open_store();
        let item = store.create("Widget", "", None).unwrap();
        let raw = fs::read_to_string(store.items_dir().join(format!("{}.json", item.id))).unwrap();
        assert!(!raw.contains("photo"));
    }

    #[test]
    fn test_update_is_partial() {
        let (_dir, store) = open_store();
        let item = store.create("Widget", "Blue", None).unwrap();

        let patch = ItemPatch {
            description: Some("Red".to_string()),
            ..Default::default()
        };
        let updated = store.update(&item.id, patch).unwrap();
        assert_eq!(updated.name, "Widget");
        assert_eq!(updated.description, "Red");
        assert_eq!(store.get(&item.id).unwrap().description, "Red");
    }

    #[test]
    fn test_update_missing_item() {
        let (_dir, store) = open_store();
        let result = store.update("nope", ItemPatch::default());
        assert_eq!(result.unwrap_err(), Exception::ItemNotFound);
    }

    #[test]
    fn test_delete_removes_record_and_photo() {
        let (_dir, store) = open_store();
        let item = store.create("Widget", "", Some(&b"\xFF\xD8jpeg"[..])).unwrap();
        assert!(store.get_photo(&item.id).is_ok());

        assert!(store.delete(&item.id).unwrap());
        assert_eq!(store.get(&item.id).unwrap_err(), Exception::ItemNotFound);
        assert_eq!(store.get_photo(&item.id).unwrap_err(), Exception::ItemNotFound);
        assert!(!store.items_dir().join(format!("{}.jpg", item.id)).exists());

        assert!(!store.delete(&item.id).unwrap());
    }

    #[test]
    fn test_list_skips_corrupt_records() {
        let (_dir, store) = open_store();
        let a = store.create("a", "", None).unwrap();
        let b = store.create("b", "", None).unwrap();
        fs::write(store.items_dir().join("broken.json"), b"{not json").unwrap();
        fs::write(store.items_dir().join("notes.txt"), b"ignored").unwrap();

        let items = store.list();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, a.id);
        assert_eq!(items[1].id, b.id);
    }

    #[test]
    fn test_corrupt_record_is_not_found() {
        let (_dir, store) = open_store();
        fs::write(store.items_dir().join("bad.json"), b"[]").unwrap();
        assert_eq!(store.get("bad").unwrap_err(), Exception::ItemNotFound);
    }

    #[test]
    fn test_record_with_extra_fields_is_readable() {
        let (_dir, store) = open_store();
        fs::write(
            store.items_dir().join("legacy.json"),
            br#"{"id":"legacy","name":"Old","description":"d","photo":"http://x/inventory/legacy/photo"}"#,
        )
        .unwrap();
        let item = store.get("legacy").unwrap();
        assert_eq!(item.name, "Old");
    }

    #[test]
    fn test_set_photo_twice_returns_latest() {
        let (_dir, store) = open_store();
        let item = store.create("Widget", "", None).unwrap();
        assert_eq!(store.get_photo(&item.id).unwrap_err(), Exception::PhotoNotFound);

        store.set_photo(&item.id, b"first").unwrap();
        assert_eq!(store.get_photo(&item.id).unwrap().as_ref(), b"first");

        store.set_photo(&item.id, b"second photo").unwrap();
        assert_eq!(store.get_photo(&item.id).unwrap().as_ref(), b"second photo");
    }

    #[test]
    fn test_set_photo_requires_item() {
        let (_dir, store) = open_store();
        assert_eq!(store.set_photo("ghost", b"x").unwrap_err(), Exception::ItemNotFound);
        assert!(!store.items_dir().join("ghost.jpg").exists());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(is_valid_id("0190a0b3c4d5"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id(".."));
        assert!(!is_valid_id("a/b"));
        assert!(!is_valid_id("a\\b"));

        let (_dir, store) = open_store();
        assert_eq!(store.get("..").unwrap_err(), Exception::ItemNotFound);
        assert!(!store.delete("../x").unwrap());
    }
}
