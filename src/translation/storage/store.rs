//! 持久化键值存储
//!
//! 只提供点查询、点写入和点删除，不提供枚举和过期；这两项由
//! [`TranslationCache`](super::cache::TranslationCache) 通过显式索引实现。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use redb::{Database, ReadableTable, TableDefinition};

use crate::translation::error::helpers::cache_error;
use crate::translation::error::{storage_error, TranslationResult};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("translation_cache");

/// 键值存储接口
pub trait KeyValueStore: Send + Sync {
    /// 读取键对应的值
    fn get(&self, key: &str) -> TranslationResult<Option<Vec<u8>>>;

    /// 写入（覆盖）键对应的值
    fn set(&self, key: &str, value: &[u8]) -> TranslationResult<()>;

    /// 删除键，键不存在时不视为错误
    fn delete(&self, key: &str) -> TranslationResult<()>;
}

/// 基于 redb 的磁盘存储，每次写入或删除都是一个独立事务
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    /// 打开（或创建）数据库文件
    pub fn open<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                cache_error(format!(
                    "无法创建缓存目录 {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = Database::create(&path).map_err(storage_error)?;

        // 预先建表，保证只读事务可以直接打开
        let txn = db.begin_write().map_err(storage_error)?;
        {
            txn.open_table(TABLE).map_err(storage_error)?;
        }
        txn.commit().map_err(storage_error)?;

        tracing::debug!("缓存数据库已打开: {}", path.display());

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> TranslationResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(storage_error)?;
        let table = txn.open_table(TABLE).map_err(storage_error)?;
        let value = table
            .get(key)
            .map_err(storage_error)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> TranslationResult<()> {
        let txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut table = txn.open_table(TABLE).map_err(storage_error)?;
            table.insert(key, value).map_err(storage_error)?;
        }
        txn.commit().map_err(storage_error)
    }

    fn delete(&self, key: &str) -> TranslationResult<()> {
        let txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut table = txn.open_table(TABLE).map_err(storage_error)?;
            table.remove(key).map_err(storage_error)?;
        }
        txn.commit().map_err(storage_error)
    }
}

/// 进程内存储，不落盘
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保存的键数量（包含索引键）
    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> TranslationResult<Option<Vec<u8>>> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> TranslationResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> TranslationResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("k", b"v1").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v1".to_vec()));

        store.set("k", b"v2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v2".to_vec()));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        // 删除不存在的键不报错
        store.delete("k").unwrap();
    }

    #[test]
    fn memory_store_point_operations() {
        let store = MemoryStore::new();
        exercise(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn redb_store_point_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("cache.redb")).unwrap();
        exercise(&store);
    }

    #[test]
    fn redb_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.set("translation_cache_abc", b"{}").unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert_eq!(
            store.get("translation_cache_abc").unwrap(),
            Some(b"{}".to_vec())
        );
    }
}
