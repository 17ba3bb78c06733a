use crate::error::DbError;
use crate::info;
use crate::notifications::{
    diff_results, fold_collection_changes, fold_object_changes, ChangeRecord, NotificationToken, Observer, Registry,
};
use crate::obj::Obj;
use crate::query::run_query;
use crate::results::Results;
use crate::schema::{ManagedObject, Object, ObjectKind, ObjectSchema, SchemaInfo};
use crate::storage::{self, Storage, TxView};
use crate::value::Row;
use redb::{ReadTransaction, WriteTransaction};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Open configuration. Schemas default to every type registered through the
/// derive macro (`inventory`); an explicit list avoids relying on link-time
/// collection entirely.
pub struct Config {
    path: PathBuf,
    schemas: Option<Vec<&'static ObjectSchema>>,
    cache_size_mb: usize,
}

impl Config {
    pub fn new(path: impl Into<PathBuf>) -> Config {
        Config { path: path.into(), schemas: None, cache_size_mb: 256 }
    }

    pub fn with_schemas(mut self, schemas: Vec<&'static ObjectSchema>) -> Config {
        self.schemas = Some(schemas);
        self
    }

    pub fn with_cache_size_mb(mut self, mb: usize) -> Config {
        self.cache_size_mb = mb;
        self
    }
}

pub(crate) struct TxState {
    pub(crate) read: Option<ReadTransaction>,
    pub(crate) write: Option<WriteTransaction>,
    pub(crate) generation: u64,
    pub(crate) changelog: Vec<ChangeRecord>,
    pub(crate) closed: bool,
}

pub struct RealmInner {
    pub(crate) storage: Storage,
    pub(crate) frozen: bool,
    /// For a frozen realm, the live session it was frozen from.
    pub(crate) source: Option<Arc<RealmInner>>,
    pub(crate) state: Mutex<TxState>,
    pub(crate) notifiers: Mutex<Registry>,
}

impl RealmInner {
    pub(crate) fn with_view<R>(&self, f: impl FnOnce(&TxView<'_>) -> Result<R, DbError>) -> Result<R, DbError> {
        let state = self.state.lock()?;
        if state.closed {
            return Err(DbError::Custom("Realm has been closed".into()));
        }
        if let Some(write) = state.write.as_ref() {
            f(&TxView::Write(write))
        } else if let Some(read) = state.read.as_ref() {
            f(&TxView::Read(read))
        } else {
            Err(DbError::Custom("Realm has no active transaction".into()))
        }
    }

    pub(crate) fn with_write<R>(
        &self,
        f: impl FnOnce(&WriteTransaction, &mut Vec<ChangeRecord>) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        let mut state = self.state.lock()?;
        if state.closed {
            return Err(DbError::Custom("Realm has been closed".into()));
        }
        if state.write.is_none() {
            return Err(DbError::WrongTransactionState);
        }
        let TxState { write, changelog, .. } = &mut *state;
        f(write.as_ref().unwrap_or_else(|| unreachable!()), changelog)
    }

    pub(crate) fn in_write(&self) -> bool {
        self.state.lock().map(|s| s.write.is_some()).unwrap_or(false)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().map(|s| s.generation).unwrap_or(0)
    }
}

pub(crate) fn fingerprint(row: &Row) -> u64 {
    let mut hasher = DefaultHasher::new();
    if let Ok(bytes) = crate::value::encode_row(row) {
        bytes.hash(&mut hasher);
    }
    hasher.finish()
}

/// A database session. Cloning shares the session; all accessors bound
/// through it observe the snapshot of its last refresh.
#[derive(Clone)]
pub struct Realm {
    pub(crate) inner: Arc<RealmInner>,
}

impl Realm {
    pub fn open(config: Config) -> Result<Realm, DbError> {
        let schemas = match config.schemas {
            Some(schemas) => schemas,
            None => inventory::iter::<SchemaInfo>.into_iter().map(|info| (info.schema)()).collect(),
        };
        let storage = Storage::open(&config.path, schemas, config.cache_size_mb)?;
        let read = storage.db.begin_read()?;
        let inner = RealmInner {
            storage,
            frozen: false,
            source: None,
            state: Mutex::new(TxState {
                read: Some(read),
                write: None,
                generation: 0,
                changelog: Vec::new(),
                closed: false,
            }),
            notifiers: Mutex::new(Registry::default()),
        };
        Ok(Realm { inner: Arc::new(inner) })
    }

    /// Opens a realm under the system temp directory; used heavily by tests.
    pub fn temp(name: &str, random: bool) -> Result<Realm, DbError> {
        let dir = Storage::temp_dir(name, random);
        if random && dir.exists() {
            crate::warn!("Removing stale temp db at {:?}", dir);
            std::fs::remove_dir_all(&dir)?;
        }
        Realm::open(Config::new(dir))
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen
    }

    /// Runs `f` inside the session's single write transaction: commits and
    /// refreshes on `Ok`, rolls back on `Err`.
    pub fn write<R>(&self, f: impl FnOnce(&Realm) -> Result<R, DbError>) -> Result<R, DbError> {
        if self.inner.frozen {
            return Err(DbError::FrozenWrite);
        }
        {
            let mut state = self.inner.state.lock()?;
            if state.closed {
                return Err(DbError::Custom("Realm has been closed".into()));
            }
            if state.write.is_some() {
                return Err(DbError::Custom("The write transaction is already open".into()));
            }
            state.write = Some(self.inner.storage.db.begin_write()?);
        }
        match f(self) {
            Ok(result) => {
                self.commit_and_refresh()?;
                Ok(result)
            }
            Err(e) => {
                let mut state = self.inner.state.lock()?;
                if let Some(write) = state.write.take() {
                    let _ = write.abort();
                }
                state.changelog.clear();
                Err(e)
            }
        }
    }

    fn commit_and_refresh(&self) -> Result<(), DbError> {
        let log = {
            let mut state = self.inner.state.lock()?;
            let write = state
                .write
                .take()
                .ok_or_else(|| DbError::Custom("No write transaction to commit".into()))?;
            write.commit()?;
            state.read = Some(self.inner.storage.db.begin_read()?);
            state.generation += 1;
            std::mem::take(&mut state.changelog)
        };
        self.deliver(log);
        Ok(())
    }

    /// Advances the read snapshot to the latest committed version and delivers
    /// pending notifications. Implicit after every committed write.
    pub fn refresh(&self) -> Result<(), DbError> {
        if self.inner.frozen {
            return Ok(());
        }
        let log = {
            let mut state = self.inner.state.lock()?;
            if state.closed || state.write.is_some() {
                return Ok(());
            }
            state.read = Some(self.inner.storage.db.begin_read()?);
            state.generation += 1;
            std::mem::take(&mut state.changelog)
        };
        self.deliver(log);
        Ok(())
    }

    fn deliver(&self, log: Vec<ChangeRecord>) {
        let mut observers = match self.inner.notifiers.lock() {
            Ok(mut registry) => std::mem::take(&mut registry.observers),
            Err(_) => return,
        };
        for observer in observers.values_mut() {
            match observer {
                Observer::Object { table, key, cb } => {
                    let change = fold_object_changes(&log, table, *key);
                    if !change.is_empty() {
                        cb(change);
                    }
                }
                Observer::Collection { table, key, col, cb } => {
                    let change = fold_collection_changes(&log, table, *key, *col);
                    if !change.is_empty() {
                        cb(change);
                    }
                }
                Observer::Results { table, node, last, cb } => {
                    let current = self
                        .inner
                        .with_view(|tx| run_query(tx, table, node, None))
                        .map(|rows| rows.iter().map(|(k, row)| (*k, fingerprint(row))).collect::<Vec<_>>())
                        .unwrap_or_default();
                    let change = diff_results(last, &current);
                    *last = current;
                    if !change.is_empty() {
                        cb(change);
                    }
                }
            }
        }
        if let Ok(mut registry) = self.inner.notifiers.lock() {
            for (id, observer) in observers {
                if !registry.tombstones.remove(&id) {
                    registry.observers.entry(id).or_insert(observer);
                }
            }
        }
    }

    /// Persists an unmanaged object (and its object graph) and returns its
    /// managed counterpart. Requires an open write transaction.
    pub fn add<T: Object>(&self, object: T) -> Result<T::Managed, DbError> {
        let obj = object.insert(self)?;
        Ok(T::bind(obj))
    }

    /// Deletes the row backing a managed object. Embedded children go with it.
    pub fn remove<M: ManagedObject>(&self, managed: &M) -> Result<(), DbError> {
        let obj = managed
            .object_handle()
            .ok_or(DbError::QueryMisuse("Cannot remove an object inside of `where`"))?;
        self.delete_row(obj.get_table(), obj.get_key())
    }

    /// All objects of a type, as a lazily evaluated result set.
    pub fn objects<T: Object>(&self) -> Result<Results<T>, DbError> {
        if T::KIND == ObjectKind::Asymmetric {
            return Err(DbError::Asymmetric);
        }
        self.inner.storage.schema_by_name(T::schema().name)?;
        Ok(Results::new(self.clone()))
    }

    /// Creates a row for `schema` from already-canonicalized cell values.
    /// Called by generated `Object::insert` implementations.
    pub fn create_row(&self, schema: &'static ObjectSchema, row: Row) -> Result<Obj, DbError> {
        self.inner.storage.schema_by_name(schema.name)?;
        if row.len() != schema.properties.len() {
            return Err(DbError::SchemaMismatch(format!(
                "row width {} does not match schema '{}' ({} properties)",
                row.len(),
                schema.name,
                schema.properties.len()
            )));
        }
        self.inner.with_write(|tx, changelog| {
            if let Some((pk_col, _)) = schema.primary_key() {
                let pk_bytes = storage::encode_pk(&row[pk_col.ix()])?;
                if storage::pk_lookup(&TxView::Write(tx), schema.name, &pk_bytes)?.is_some() {
                    return Err(DbError::DuplicatePrimaryKey(schema.name));
                }
                let key = storage::next_key(tx, schema.name)?;
                storage::pk_insert(tx, schema.name, &pk_bytes, key)?;
                storage::put_row(tx, schema.name, key, &row)?;
                changelog.push(ChangeRecord::RowCreated { table: schema.name, key });
                Ok(key)
            } else {
                let key = storage::next_key(tx, schema.name)?;
                storage::put_row(tx, schema.name, key, &row)?;
                changelog.push(ChangeRecord::RowCreated { table: schema.name, key });
                Ok(key)
            }
        })
        .map(|key| Obj::new(self.clone(), schema, key))
    }

    pub(crate) fn delete_row(&self, schema: &'static ObjectSchema, key: u64) -> Result<(), DbError> {
        use crate::schema::PropertyKind;
        let row = self.inner.with_write(|tx, _| storage::get_row(&TxView::Write(tx), schema.name, key))?;
        let row = match row {
            Some(row) => row,
            None => return Ok(()),
        };
        // Embedded children are owned by this row and are cascaded away.
        let mut embedded: Vec<(&'static ObjectSchema, u64)> = Vec::new();
        for (property, cell) in schema.properties.iter().zip(row.iter()) {
            let target = match property.kind {
                PropertyKind::Object { target } => Some(target),
                PropertyKind::List(PropertyKind::Object { target }) => Some(*target),
                _ => None,
            };
            let Some(target) = target else { continue };
            let target_schema = self.inner.storage.schema_by_name(target)?;
            if target_schema.kind != ObjectKind::Embedded {
                continue;
            }
            match cell {
                crate::value::Value::Link { key, .. } => embedded.push((target_schema, *key)),
                crate::value::Value::List(items) => {
                    for item in items {
                        if let crate::value::Value::Link { key, .. } = item {
                            embedded.push((target_schema, *key));
                        }
                    }
                }
                _ => {}
            }
        }
        self.inner.with_write(|tx, changelog| {
            if let Some((pk_col, _)) = schema.primary_key() {
                let pk_bytes = storage::encode_pk(&row[pk_col.ix()])?;
                storage::pk_remove(tx, schema.name, &pk_bytes)?;
            }
            storage::remove_row(tx, schema.name, key)?;
            changelog.push(ChangeRecord::RowDeleted { table: schema.name, key });
            Ok(())
        })?;
        for (child_schema, child_key) in embedded {
            self.delete_row(child_schema, child_key)?;
        }
        Ok(())
    }

    /// An immutable snapshot of this session pinned at its current version.
    pub fn freeze(&self) -> Result<Realm, DbError> {
        if self.inner.frozen {
            return Ok(self.clone());
        }
        let generation = {
            let state = self.inner.state.lock()?;
            if state.closed {
                return Err(DbError::Custom("Realm has been closed".into()));
            }
            state.generation
        };
        let read = self.inner.storage.db.begin_read()?;
        let inner = RealmInner {
            storage: self.inner.storage.clone(),
            frozen: true,
            source: Some(self.inner.clone()),
            state: Mutex::new(TxState {
                read: Some(read),
                write: None,
                generation,
                changelog: Vec::new(),
                closed: false,
            }),
            notifiers: Mutex::new(Registry::default()),
        };
        Ok(Realm { inner: Arc::new(inner) })
    }

    /// The live session a frozen realm was created from.
    pub fn thaw(&self) -> Result<Realm, DbError> {
        match &self.inner.source {
            Some(source) if self.inner.frozen => Ok(Realm { inner: source.clone() }),
            _ => Ok(self.clone()),
        }
    }

    pub fn close(&self) -> Result<(), DbError> {
        let mut state = self.inner.state.lock()?;
        if let Some(write) = state.write.take() {
            let _ = write.abort();
        }
        state.read = None;
        state.closed = true;
        info!("Closed realm at {:?}", self.inner.storage.path);
        Ok(())
    }

    /// Subscribes an observer for delivery on the next refresh. Frozen
    /// sessions never change, so subscribing through one is an error.
    pub(crate) fn register_observer(&self, observer: Observer) -> Result<NotificationToken, DbError> {
        if self.inner.frozen {
            return Err(DbError::FrozenNotifications);
        }
        let id = self.inner.notifiers.lock()?.register(observer);
        Ok(NotificationToken::new(id, &self.inner))
    }

    /// True when both sessions view the same database at the same version and
    /// temperature. Managed-object equality builds on this.
    pub(crate) fn same_session(&self, other: &Realm) -> bool {
        Arc::ptr_eq(&self.inner.storage.db, &other.inner.storage.db)
            && self.inner.frozen == other.inner.frozen
            && self.inner.generation() == other.inner.generation()
    }
}

/// Handover token for passing a managed object between threads: carries no
/// live handle, only the table and row key, and re-resolves against the
/// destination session.
pub struct ThreadSafeReference<T: Object> {
    table: &'static str,
    key: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Object> ThreadSafeReference<T> {
    pub fn new<M>(managed: &M) -> Result<ThreadSafeReference<T>, DbError>
    where
        M: ManagedObject<Plain = T>,
    {
        let obj = managed
            .object_handle()
            .ok_or(DbError::QueryMisuse("Cannot hand over an object inside of `where`"))?;
        Ok(ThreadSafeReference { table: obj.get_table().name, key: obj.get_key(), _marker: PhantomData })
    }

    pub fn resolve(self, realm: &Realm) -> Result<T::Managed, DbError> {
        let schema = realm.inner.storage.schema_by_name(self.table)?;
        let obj = Obj::new(realm.clone(), schema, self.key);
        if !obj.is_valid() {
            return Err(DbError::InvalidatedObject);
        }
        Ok(T::bind(obj))
    }
}
