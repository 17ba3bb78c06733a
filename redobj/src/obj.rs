use crate::error::DbError;
use crate::notifications::{ChangeRecord, CollOp, NotificationToken, ObjectChange, Observer};
use crate::realm::Realm;
use crate::schema::{ColKey, ObjectSchema};
use crate::storage::{self, TxView};
use crate::value::Value;
use std::fmt;

/// Handle to one persisted row. Cheap to clone; every property accessor of a
/// managed object holds its own copy together with a resolved column key.
#[derive(Clone)]
pub struct Obj {
    realm: Realm,
    schema: &'static ObjectSchema,
    key: u64,
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("table", &self.schema.name)
            .field("key", &self.key)
            .finish()
    }
}

impl Obj {
    pub(crate) fn new(realm: Realm, schema: &'static ObjectSchema, key: u64) -> Obj {
        Obj { realm, schema, key }
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn get_table(&self) -> &'static ObjectSchema {
        self.schema
    }

    pub fn get_key(&self) -> u64 {
        self.key
    }

    /// Whether the backing row still exists in the current snapshot.
    pub fn is_valid(&self) -> bool {
        self.realm
            .inner
            .with_view(|tx| storage::get_row(tx, self.schema.name, self.key))
            .map(|row| row.is_some())
            .unwrap_or(false)
    }

    pub fn get_value(&self, col: ColKey) -> Result<Value, DbError> {
        let row = self
            .realm
            .inner
            .with_view(|tx| storage::get_row(tx, self.schema.name, self.key))?
            .ok_or(DbError::InvalidatedObject)?;
        row.get(col.ix())
            .cloned()
            .ok_or_else(|| DbError::SchemaMismatch(format!("column {:?} out of range for '{}'", col, self.schema.name)))
    }

    pub fn is_null(&self, col: ColKey) -> Result<bool, DbError> {
        Ok(self.get_value(col)?.is_null())
    }

    /// Writes one cell through to storage, recording a property change for
    /// observers. Requires an open write transaction.
    pub fn set_value(&self, col: ColKey, value: Value) -> Result<(), DbError> {
        let property = self
            .schema
            .property(col)
            .ok_or_else(|| DbError::SchemaMismatch(format!("column {:?} out of range for '{}'", col, self.schema.name)))?;
        if property.primary_key {
            return Err(DbError::Custom(format!("Cannot modify primary key property '{}'", property.name)));
        }
        let schema = self.schema;
        let key = self.key;
        self.realm.inner.with_write(|tx, changelog| {
            let mut row = storage::get_row(&TxView::Write(tx), schema.name, key)?.ok_or(DbError::InvalidatedObject)?;
            let old = std::mem::replace(&mut row[col.ix()], value.clone());
            storage::put_row(tx, schema.name, key, &row)?;
            changelog.push(ChangeRecord::Prop { table: schema.name, key, name: property.name, old, new: value });
            Ok(())
        })
    }

    pub fn set_null(&self, col: ColKey) -> Result<(), DbError> {
        self.set_value(col, Value::Null)
    }

    pub fn get_linked_object(&self, col: ColKey) -> Result<Option<Obj>, DbError> {
        match self.get_value(col)? {
            Value::Null => Ok(None),
            Value::Link { table, key } => {
                let schema = self.realm.inner.storage.schema_by_name(&table)?;
                Ok(Some(Obj::new(self.realm.clone(), schema, key)))
            }
            other => Err(DbError::SchemaMismatch(format!("expected link value, got {:?}", other))),
        }
    }

    /// Read-modify-write for collection cells; `mutate` returns the index
    /// operations to record for collection observers.
    pub(crate) fn update_cell(
        &self,
        col: ColKey,
        mutate: impl FnOnce(&mut Value) -> Result<Vec<CollOp>, DbError>,
    ) -> Result<(), DbError> {
        let schema = self.schema;
        let key = self.key;
        self.realm.inner.with_write(|tx, changelog| {
            let mut row = storage::get_row(&TxView::Write(tx), schema.name, key)?.ok_or(DbError::InvalidatedObject)?;
            let ops = mutate(&mut row[col.ix()])?;
            if ops.is_empty() {
                return Ok(());
            }
            storage::put_row(tx, schema.name, key, &row)?;
            for op in ops {
                changelog.push(ChangeRecord::Collection { table: schema.name, key, col, op });
            }
            Ok(())
        })
    }

    /// Subscribes to property changes and deletion of this row.
    pub fn observe(&self, cb: impl FnMut(ObjectChange) + Send + 'static) -> Result<NotificationToken, DbError> {
        self.realm.register_observer(Observer::Object {
            table: self.schema.name,
            key: self.key,
            cb: Box::new(cb),
        })
    }

    /// Rebinds this handle against a frozen snapshot of its session.
    pub fn freeze_handle(&self) -> Result<Obj, DbError> {
        let frozen = self.realm.freeze()?;
        Ok(Obj::new(frozen, self.schema, self.key))
    }

    /// Rebinds this handle against the live session; the row must still exist.
    pub fn thaw_handle(&self) -> Result<Obj, DbError> {
        if !self.is_valid() {
            return Err(DbError::ThawInvalidated);
        }
        if !self.realm.is_frozen() {
            return Ok(self.clone());
        }
        let live = self.realm.thaw()?;
        Ok(Obj::new(live, self.schema, self.key))
    }

    /// Identity: same session (database, version, temperature), same table,
    /// same row key.
    pub fn same_row(&self, other: &Obj) -> bool {
        self.realm.same_session(&other.realm) && self.schema.name == other.schema.name && self.key == other.key
    }

    pub fn to_json(&self) -> Result<serde_json::Value, DbError> {
        let row = self
            .realm
            .inner
            .with_view(|tx| storage::get_row(tx, self.schema.name, self.key))?
            .ok_or(DbError::InvalidatedObject)?;
        let mut map = serde_json::Map::new();
        for (property, cell) in self.schema.properties.iter().zip(row.iter()) {
            map.insert(property.name.to_string(), cell.into());
        }
        Ok(serde_json::Value::Object(map))
    }
}

/// Equality used by generated `PartialEq` impls on managed wrappers.
/// A query-capture proxy backs no row, so comparing one has no boolean
/// answer; `PartialEq` must return one, so this panics instead.
pub fn managed_objects_equal(a: Option<&Obj>, b: Option<&Obj>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_row(b),
        _ => panic!("This comparison operator is not valid inside of `where`"),
    }
}
