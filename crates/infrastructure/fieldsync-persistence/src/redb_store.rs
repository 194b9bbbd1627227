use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use crate::api::{DbState, CURRENT_SCHEMA, FIELDSYNC_REDB_FILENAME};
use crate::keys::validate_key;
use crate::maintenance::quarantine_corrupt_file;
use crate::{KeyValueStore, StorageError};

const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
const KV: TableDefinition<&str, &str> = TableDefinition::new("kv");

const META_FORMAT_KEY: &str = "format";
const META_FORMAT_VALUE: &str = "fieldsync-redb";
const META_SCHEMA_VERSION: &str = "schema_version";
const META_CREATED_AT: &str = "created_at";
const META_LAST_WRITE_AT: &str = "last_write_at";

/// Key/value store backed by a single `fieldsync.redb` file under a data root.
///
/// Every `set`/`remove` is its own committed write transaction.
#[derive(Clone)]
pub struct RedbKeyValueStore {
    root: Utf8PathBuf,
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbKeyValueStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl RedbKeyValueStore {
    fn is_corrupt_open_error(err: &redb::DatabaseError) -> bool {
        match err {
            redb::DatabaseError::Storage(storage) => match storage {
                redb::StorageError::Corrupted(_) => true,
                redb::StorageError::Io(ioe) => matches!(
                    ioe.kind(),
                    std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
                ),
                _ => false,
            },
            _ => false,
        }
    }

    // redb refuses a second handle to the same file within one process, so
    // every store opened on a path shares one `Database`.
    fn db_cache() -> &'static Mutex<HashMap<Utf8PathBuf, Arc<Database>>> {
        static CACHE: OnceLock<Mutex<HashMap<Utf8PathBuf, Arc<Database>>>> = OnceLock::new();
        CACHE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    pub fn path_for_root(root: &Utf8Path) -> Utf8PathBuf {
        root.join(FIELDSYNC_REDB_FILENAME)
    }

    /// Opens the store under `root`, creating the database on first use.
    ///
    /// A corrupt file is quarantined and reported as [`StorageError::Corrupt`];
    /// the next open starts from an empty database.
    pub fn open(root: &Utf8Path) -> Result<Self, StorageError> {
        let db = Self::open_or_create(root)?;
        Ok(Self {
            root: root.to_owned(),
            db,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn open_or_create(root: &Utf8Path) -> Result<Arc<Database>, StorageError> {
        let path = Self::path_for_root(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut cache = Self::db_cache().lock().expect("db cache lock poisoned");
        if let Some(existing) = cache.get(&path) {
            if !path.exists() {
                cache.remove(&path);
            } else {
                return Ok(existing.clone());
            }
        }

        let db = if path.exists() {
            match Database::open(path.as_std_path()) {
                Ok(db) => db,
                Err(redb::DatabaseError::DatabaseAlreadyOpen) => {
                    return Err(StorageError::DatabaseAlreadyOpen);
                }
                Err(e) if Self::is_corrupt_open_error(&e) => {
                    let _ = quarantine_corrupt_file(&path);
                    return Err(StorageError::Corrupt);
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            Database::create(path.as_std_path())?
        };

        if let Err(e) = Self::ensure_schema(&db) {
            drop(db);
            if matches!(e, StorageError::Corrupt) {
                let _ = quarantine_corrupt_file(&path);
            }
            return Err(e);
        }
        tracing::debug!("opened key/value store at {}", path);
        let db = Arc::new(db);
        cache.insert(path, db.clone());
        Ok(db)
    }

    fn ensure_schema(db: &Database) -> Result<(), StorageError> {
        // Create tables and required meta keys on first open.
        let write_tx = db.begin_write()?;
        {
            let mut meta = write_tx.open_table(META)?;
            let format: Option<String> = meta.get(META_FORMAT_KEY)?.map(|g| g.value().to_string());
            if format.is_none() {
                let schema_version = CURRENT_SCHEMA.to_string();
                let created_at = Utc::now().to_rfc3339();
                meta.insert(META_FORMAT_KEY, META_FORMAT_VALUE)?;
                meta.insert(META_SCHEMA_VERSION, schema_version.as_str())?;
                meta.insert(META_CREATED_AT, created_at.as_str())?;
            } else if format.as_deref() != Some(META_FORMAT_VALUE) {
                return Err(StorageError::Corrupt);
            }
        }
        let _ = write_tx.open_table(KV)?;
        write_tx.commit()?;

        let read_tx = db.begin_read()?;
        let meta = read_tx.open_table(META)?;
        let schema_version = meta
            .get(META_SCHEMA_VERSION)?
            .and_then(|g| g.value().parse::<u32>().ok())
            .unwrap_or(0);
        if schema_version == 0 {
            return Err(StorageError::Corrupt);
        }
        if schema_version > CURRENT_SCHEMA {
            return Err(StorageError::NewerSchema {
                found: schema_version,
                supported: CURRENT_SCHEMA,
            });
        }
        if schema_version != CURRENT_SCHEMA {
            return Err(StorageError::Corrupt);
        }
        Ok(())
    }

    /// Reports the state of the database under `root` without creating it.
    pub fn validate(root: &Utf8Path) -> Result<DbState, StorageError> {
        let path = Self::path_for_root(root);
        if !path.exists() {
            return Ok(DbState::Missing);
        }
        {
            let mut cache = Self::db_cache().lock().expect("db cache lock poisoned");
            if cache.contains_key(&path) {
                if !path.exists() {
                    cache.remove(&path);
                    return Ok(DbState::Missing);
                }
                return Ok(DbState::Valid);
            }
        }

        match Database::open(path.as_std_path()) {
            Ok(db) => match Self::ensure_schema(&db) {
                Ok(()) => Ok(DbState::Valid),
                Err(StorageError::NewerSchema { found, supported }) => {
                    Ok(DbState::NewerSchema { found, supported })
                }
                Err(StorageError::DatabaseAlreadyOpen) => Ok(DbState::Busy),
                Err(StorageError::Corrupt) => {
                    drop(db);
                    let _ = quarantine_corrupt_file(&path);
                    Ok(DbState::Corrupt)
                }
                Err(e) => Err(e),
            },
            Err(redb::DatabaseError::DatabaseAlreadyOpen) => Ok(DbState::Busy),
            Err(e) if Self::is_corrupt_open_error(&e) => {
                let _ = quarantine_corrupt_file(&path);
                Ok(DbState::Corrupt)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut redb::Table<'_, &'static str, &'static str>) -> Result<(), StorageError>,
    {
        let write_tx = self.db.begin_write()?;
        {
            let mut table = write_tx.open_table(KV)?;
            apply(&mut table)?;
            let ts = Utc::now().to_rfc3339();
            let mut meta = write_tx.open_table(META)?;
            meta.insert(META_LAST_WRITE_AT, ts.as_str())?;
        }
        write_tx.commit()?;
        Ok(())
    }
}

impl KeyValueStore for RedbKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        let read_tx = self.db.begin_read()?;
        let table = read_tx.open_table(KV)?;
        let value = table.get(key)?.map(|g| g.value().to_string());
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.write(|table| {
            table.insert(key, value)?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.write(|table| {
            let _ = table.remove(key)?;
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let read_tx = self.db.begin_read()?;
        let table = read_tx.open_table(KV)?;
        let mut out = Vec::new();
        for row in table.iter()? {
            let (k, _) = row?;
            out.push(k.value().to_string());
        }
        Ok(out)
    }
}
