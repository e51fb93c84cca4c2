//! 翻译缓存模块
//!
//! 以 (原文, 模型) 为内容寻址键的持久化翻译缓存：
//!
//! - 条目写入后 7 天过期，过期在读取时惰性发现并删除
//! - 条目数超过上限时按写入时间戳淘汰最旧的条目
//! - 存储本身不支持枚举，因此额外维护一个显式的键索引
//!
//! 淘汰顺序只由写入时间戳决定，`get` 不会刷新条目的新旧程度，这不是 LRU。

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::clock::{Clock, SystemClock};
use super::key::derive_key;
use super::store::{KeyValueStore, RedbStore};
use crate::translation::config::constants::{CACHE_KEY_PREFIX, CACHE_TTL, MAX_CACHE_ENTRIES};
use crate::translation::error::helpers::cache_error;
use crate::translation::error::{TranslationError, TranslationResult};

const INDEX_SUFFIX: &str = "index";

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub source_text: String,
    pub translated_text: String,
    pub model: String,
    /// 最后一次写入的 Unix 毫秒时间戳
    pub timestamp: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) > CACHE_TTL.as_millis() as u64
    }

    /// 粗略的占用估算：原文与译文的字符数之和
    fn footprint(&self) -> usize {
        self.source_text.chars().count() + self.translated_text.chars().count()
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size: usize,
}

/// 翻译缓存
///
/// 唯一允许读写底层存储的组件。索引的读-改-写由内部互斥锁串行化。
pub struct TranslationCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    /// 索引的内存镜像，首次使用时从存储加载，写穿
    index: Mutex<Option<Vec<String>>>,
}

impl TranslationCache {
    /// 使用系统时钟创建缓存
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            index: Mutex::new(None),
        }
    }

    /// 打开磁盘上的缓存数据库
    pub fn open<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let store = RedbStore::open(path)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// 查询缓存的译文
    ///
    /// 未命中、已过期或读取失败都返回 `None`；读取失败只记录日志。
    pub fn get(&self, source_text: &str, model: &str) -> Option<String> {
        let key = derive_key(source_text, model);

        let entry = match self.read_entry(&key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                metrics::counter!("translation_cache_misses_total").increment(1);
                return None;
            }
            Err(e) => {
                tracing::warn!("读取翻译缓存失败，按未命中处理: {}", e);
                metrics::counter!("translation_cache_misses_total").increment(1);
                return None;
            }
        };

        if entry.is_expired(self.clock.now_millis()) {
            tracing::debug!(key = %key, "缓存条目已过期");
            self.remove_expired(&key);
            metrics::counter!("translation_cache_misses_total").increment(1);
            return None;
        }

        metrics::counter!("translation_cache_hits_total").increment(1);
        Some(entry.translated_text)
    }

    /// 写入译文并刷新时间戳
    ///
    /// 条目或索引写入失败会返回错误，索引写入失败时刚写入的条目会被回滚；随后的淘汰清理
    /// 失败只记录日志，下一次写入时重试。
    pub fn set(&self, source_text: &str, translated_text: &str, model: &str) -> TranslationResult<()> {
        let key = derive_key(source_text, model);
        let entry = CacheEntry {
            key: key.clone(),
            source_text: source_text.to_string(),
            translated_text: translated_text.to_string(),
            model: model.to_string(),
            timestamp: self.clock.now_millis(),
        };

        let bytes = serde_json::to_vec(&entry)?;

        let mut index = self.lock_index();
        self.store
            .set(&storage_key(&key), &bytes)
            .map_err(|e| e.with_context("写入缓存条目"))?;

        if let Err(e) = self.index_key_added(&mut index, &key) {
            if let Err(rollback) = self.store.delete(&storage_key(&key)) {
                tracing::error!(key = %key, "回滚未入索引的缓存条目失败: {}", rollback);
            }
            return Err(e.with_context("更新缓存索引"));
        }

        if let Err(e) = self.evict_excess(&mut index) {
            tracing::warn!("缓存淘汰清理失败: {}", e);
        }

        Ok(())
    }

    /// 是否存在未过期的缓存；不会延长条目寿命
    pub fn has(&self, source_text: &str, model: &str) -> bool {
        self.get(source_text, model).is_some()
    }

    /// 清空所有缓存
    ///
    /// 单个键删除失败只记录日志，不影响其余键；删除失败的键保留在索引中。
    pub fn clear(&self) {
        let mut index = self.lock_index();

        let keys = match self.loaded_index(&mut index) {
            Ok(keys) => std::mem::take(keys),
            Err(e) => {
                tracing::error!("清空翻译缓存失败，无法读取索引: {}", e);
                return;
            }
        };

        let total = keys.len();
        let remaining: Vec<String> = keys
            .into_iter()
            .filter(|key| match self.store.delete(&storage_key(key)) {
                Ok(()) => false,
                Err(e) => {
                    tracing::warn!(key = %key, "删除缓存条目失败: {}", e);
                    true
                }
            })
            .collect();

        let removed = total - remaining.len();
        if let Err(e) = self.write_index(&mut index, remaining) {
            tracing::warn!("清空后写入缓存索引失败: {}", e);
        }

        tracing::info!("翻译缓存已清空: 删除 {}/{} 个条目", removed, total);
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> CacheStats {
        let mut index = self.lock_index();

        let keys = match self.loaded_index(&mut index) {
            Ok(keys) => keys.clone(),
            Err(e) => {
                tracing::warn!("读取缓存统计失败: {}", e);
                return CacheStats::default();
            }
        };
        drop(index);

        let total_size = keys
            .iter()
            .filter_map(|key| match self.read_entry(key) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(key = %key, "读取缓存条目失败: {}", e);
                    None
                }
            })
            .map(|entry| entry.footprint())
            .sum();

        CacheStats {
            entry_count: keys.len(),
            total_size,
        }
    }

    /// 把新键追加到索引；已存在时不写入
    fn index_key_added(
        &self,
        index: &mut MutexGuard<'_, Option<Vec<String>>>,
        key: &str,
    ) -> TranslationResult<()> {
        let keys = self.loaded_index(index)?;
        if keys.iter().any(|k| k == key) {
            return Ok(());
        }

        let mut updated = keys.clone();
        updated.push(key.to_string());
        self.write_index(index, updated)
    }

    /// 淘汰超出上限的最旧条目（按写入时间戳升序）
    fn evict_excess(&self, index: &mut MutexGuard<'_, Option<Vec<String>>>) -> TranslationResult<()> {
        let keys = self.loaded_index(index)?;
        if keys.len() <= MAX_CACHE_ENTRIES {
            return Ok(());
        }

        let keys = keys.clone();
        let mut entries: Vec<(String, u64)> = Vec::with_capacity(keys.len());
        for key in keys {
            match self.read_entry(&key) {
                Ok(Some(entry)) => entries.push((key, entry.timestamp)),
                // 索引中没有对应条目的键直接丢弃
                Ok(None) => {}
                // 损坏的条目视为最旧
                Err(TranslationError::SerializationError(_)) => entries.push((key, 0)),
                Err(e) => return Err(e),
            }
        }

        entries.sort_by_key(|(_, timestamp)| *timestamp);

        let excess = entries.len().saturating_sub(MAX_CACHE_ENTRIES);
        let survivors = entries.split_off(excess);

        for (key, _) in &entries {
            self.store.delete(&storage_key(key))?;
        }

        let survivors: Vec<String> = survivors.into_iter().map(|(key, _)| key).collect();
        self.write_index(index, survivors)?;

        metrics::counter!("translation_cache_evictions_total").increment(excess as u64);
        tracing::debug!("缓存超出上限，淘汰 {} 个最旧条目", excess);

        Ok(())
    }

    /// 删除过期条目及其索引记录
    ///
    /// 持锁后重新读取条目：读取与加锁之间可能有并发的 `set` 写入了新译文，此时保留。
    fn remove_expired(&self, key: &str) {
        let mut index = self.lock_index();

        match self.read_entry(key) {
            Ok(Some(entry)) if !entry.is_expired(self.clock.now_millis()) => {
                tracing::debug!(key = %key, "条目已被重新写入，跳过过期清理");
                return;
            }
            Ok(_) | Err(TranslationError::SerializationError(_)) => {}
            Err(e) => {
                tracing::warn!(key = %key, "重新读取过期缓存条目失败: {}", e);
                return;
            }
        }

        if let Err(e) = self.store.delete(&storage_key(key)) {
            tracing::warn!(key = %key, "删除过期缓存条目失败: {}", e);
            return;
        }

        let remaining = match self.loaded_index(&mut index) {
            Ok(keys) => {
                if !keys.iter().any(|k| k == key) {
                    return;
                }
                keys.iter().filter(|k| *k != key).cloned().collect()
            }
            Err(e) => {
                tracing::warn!("读取缓存索引失败: {}", e);
                return;
            }
        };

        if let Err(e) = self.write_index(&mut index, remaining) {
            tracing::warn!("更新缓存索引失败: {}", e);
        }
    }

    fn read_entry(&self, key: &str) -> TranslationResult<Option<CacheEntry>> {
        match self.store.get(&storage_key(key))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn lock_index(&self) -> MutexGuard<'_, Option<Vec<String>>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 返回索引镜像，必要时先从存储加载
    fn loaded_index<'a>(
        &self,
        index: &'a mut MutexGuard<'_, Option<Vec<String>>>,
    ) -> TranslationResult<&'a mut Vec<String>> {
        if index.is_none() {
            let keys = match self.store.get(&index_key())? {
                Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                    cache_error(format!("缓存索引已损坏: {}", e))
                })?,
                None => Vec::new(),
            };
            **index = Some(keys);
        }

        match index.as_mut() {
            Some(keys) => Ok(keys),
            None => Err(TranslationError::InternalError("缓存索引未加载".to_string())),
        }
    }

    /// 写入索引；失败时丢弃内存镜像，下次从存储重新加载
    fn write_index(
        &self,
        index: &mut MutexGuard<'_, Option<Vec<String>>>,
        keys: Vec<String>,
    ) -> TranslationResult<()> {
        let result = serde_json::to_vec(&keys)
            .map_err(TranslationError::from)
            .and_then(|bytes| self.store.set(&index_key(), &bytes));

        match result {
            Ok(()) => {
                **index = Some(keys);
                Ok(())
            }
            Err(e) => {
                **index = None;
                Err(e)
            }
        }
    }
}

fn storage_key(key: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, key)
}

fn index_key() -> String {
    format!("{}{}", CACHE_KEY_PREFIX, INDEX_SUFFIX)
}
