use crate::error::DbError;
use crate::info;
use crate::schema::ObjectSchema;
use crate::value::{decode_row, encode_row, Row, Value};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, TableError, WriteTransaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

const META: TableDefinition<&str, u64> = TableDefinition::new("__meta");

/// The embedded storage engine: one redb table per object type holding
/// bincode-encoded rows under sequential u64 keys, plus a `<name>.pk` index
/// table per primary-keyed type and a `__meta` table for key counters.
#[derive(Clone)]
pub struct Storage {
    pub(crate) db: Arc<Database>,
    pub(crate) schemas: Arc<Vec<&'static ObjectSchema>>,
    pub(crate) path: PathBuf,
}

impl Storage {
    pub fn open(db_dir: &Path, schemas: Vec<&'static ObjectSchema>, cache_size_mb: usize) -> Result<Storage, DbError> {
        let db_path = db_dir.join("objects.db");
        let db = if !db_dir.exists() || !db_path.exists() {
            fs::create_dir_all(db_dir)?;
            Database::builder().set_cache_size(cache_size_mb * 1024 * 1024).create(&db_path)?
        } else {
            info!("Opening existing db at {:?}, it might take a while in case previous process was killed", db_path);
            Database::builder().set_cache_size(cache_size_mb * 1024 * 1024).open(&db_path)?
        };
        // Tables are created eagerly so that later read transactions never
        // observe a missing table for a registered type.
        let tx = db.begin_write()?;
        {
            tx.open_table(META)?;
            for schema in &schemas {
                tx.open_table(row_table(schema.name))?;
                if schema.primary_key().is_some() {
                    let name = pk_table_name(schema.name);
                    tx.open_table(pk_table(&name))?;
                }
            }
        }
        tx.commit()?;
        Ok(Storage { db: Arc::new(db), schemas: Arc::new(schemas), path: db_dir.to_path_buf() })
    }

    pub(crate) fn temp_dir(name: &str, random: bool) -> PathBuf {
        let db_name = if random { format!("{}_{}", name, rand::random::<u64>()) } else { name.to_string() };
        env::temp_dir().join(format!("redobj/{}", db_name))
    }

    pub(crate) fn schema_by_name(&self, name: &str) -> Result<&'static ObjectSchema, DbError> {
        self.schemas
            .iter()
            .copied()
            .find(|s| s.name == name)
            .ok_or_else(|| DbError::SchemaMismatch(format!("object type '{}' is not part of the opened schema", name)))
    }
}

fn row_table(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

fn pk_table_name(name: &str) -> String {
    format!("{}.pk", name)
}

fn pk_table(name: &str) -> TableDefinition<'_, &'static [u8], u64> {
    TableDefinition::new(name)
}

/// Read-side view over whichever transaction is currently active.
pub(crate) enum TxView<'a> {
    Read(&'a ReadTransaction),
    Write(&'a WriteTransaction),
}

pub(crate) fn get_row(tx: &TxView<'_>, table: &str, key: u64) -> Result<Option<Row>, DbError> {
    let def = row_table(table);
    match tx {
        TxView::Read(r) => match r.open_table(def) {
            Ok(t) => match t.get(key)? {
                Some(guard) => Ok(Some(decode_row(guard.value())?)),
                None => Ok(None),
            },
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        },
        TxView::Write(w) => {
            let t = w.open_table(def)?;
            let row = match t.get(key)? {
                Some(guard) => Some(decode_row(guard.value())?),
                None => None,
            };
            Ok(row)
        }
    }
}

pub(crate) fn scan_rows(tx: &TxView<'_>, table: &str) -> Result<Vec<(u64, Row)>, DbError> {
    let def = row_table(table);
    let mut out = Vec::new();
    match tx {
        TxView::Read(r) => match r.open_table(def) {
            Ok(t) => {
                for entry in t.range::<u64>(..)? {
                    let (k, v) = entry?;
                    out.push((k.value(), decode_row(v.value())?));
                }
            }
            Err(TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(e.into()),
        },
        TxView::Write(w) => {
            let t = w.open_table(def)?;
            for entry in t.range::<u64>(..)? {
                let (k, v) = entry?;
                out.push((k.value(), decode_row(v.value())?));
            }
        }
    }
    Ok(out)
}

pub(crate) fn put_row(w: &WriteTransaction, table: &str, key: u64, row: &Row) -> Result<(), DbError> {
    let bytes = encode_row(row)?;
    let mut t = w.open_table(row_table(table))?;
    t.insert(key, bytes.as_slice())?;
    Ok(())
}

pub(crate) fn remove_row(w: &WriteTransaction, table: &str, key: u64) -> Result<bool, DbError> {
    let mut t = w.open_table(row_table(table))?;
    let removed = t.remove(key)?.is_some();
    Ok(removed)
}

/// Allocates the next object key for a table from the `__meta` counter.
pub(crate) fn next_key(w: &WriteTransaction, table: &str) -> Result<u64, DbError> {
    let mut meta = w.open_table(META)?;
    let seq_key = format!("seq:{}", table);
    let next = meta.get(seq_key.as_str())?.map(|g| g.value()).unwrap_or(0) + 1;
    meta.insert(seq_key.as_str(), next)?;
    Ok(next)
}

pub(crate) fn encode_pk(value: &Value) -> Result<Vec<u8>, DbError> {
    Ok(bincode::encode_to_vec(value, bincode::config::standard())?)
}

pub(crate) fn pk_lookup(tx: &TxView<'_>, table: &str, pk: &[u8]) -> Result<Option<u64>, DbError> {
    let name = pk_table_name(table);
    let def = pk_table(&name);
    match tx {
        TxView::Read(r) => match r.open_table(def) {
            Ok(t) => Ok(t.get(pk)?.map(|g| g.value())),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        },
        TxView::Write(w) => {
            let t = w.open_table(def)?;
            let found = t.get(pk)?.map(|g| g.value());
            Ok(found)
        }
    }
}

pub(crate) fn pk_insert(w: &WriteTransaction, table: &str, pk: &[u8], key: u64) -> Result<(), DbError> {
    let name = pk_table_name(table);
    let mut t = w.open_table(pk_table(&name))?;
    t.insert(pk, key)?;
    Ok(())
}

pub(crate) fn pk_remove(w: &WriteTransaction, table: &str, pk: &[u8]) -> Result<(), DbError> {
    let name = pk_table_name(table);
    let mut t = w.open_table(pk_table(&name))?;
    t.remove(pk)?;
    Ok(())
}
