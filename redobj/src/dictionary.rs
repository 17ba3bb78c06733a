use crate::error::DbError;
use crate::notifications::{CollOp, CollectionChange, NotificationToken, Observer};
use crate::obj::Obj;
use crate::persisted::compare_values;
use crate::rbool::{CmpOp, QueryNode, Rbool};
use crate::schema::ColKey;
use crate::value::{PropertyValue, Value};
use std::collections::BTreeMap;
use std::marker::PhantomData;

const MUTATE_IN_QUERY: &str = "Cannot modify a collection inside of `where`";
const READ_IN_QUERY: &str = "Cannot read a collection inside of `where`";

/// String-keyed dictionary of scalar values. The stored form keeps entries
/// sorted by key; change indices are positions in that order.
#[derive(Clone, Debug)]
pub enum PersistedMap<V: PropertyValue> {
    Unmanaged(BTreeMap<String, V>),
    Managed { obj: Obj, col: ColKey },
    Capture { col: ColKey },
}

impl<V: PropertyValue> PersistedMap<V> {
    pub fn new(values: BTreeMap<String, V>) -> Self {
        PersistedMap::Unmanaged(values)
    }

    pub fn assign(&mut self, obj: Obj, col: ColKey) {
        *self = PersistedMap::Managed { obj, col };
    }

    pub fn capture(col: ColKey) -> Self {
        PersistedMap::Capture { col }
    }

    fn entries(&self) -> Result<Vec<(String, Value)>, DbError> {
        match self {
            PersistedMap::Unmanaged(values) => {
                Ok(values.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
            }
            PersistedMap::Managed { obj, col } => match obj.get_value(*col)? {
                Value::Dictionary(entries) => Ok(entries),
                Value::Null => Ok(Vec::new()),
                other => Err(DbError::SchemaMismatch(format!("expected dictionary cell, got {:?}", other))),
            },
            PersistedMap::Capture { .. } => Err(DbError::QueryMisuse(READ_IN_QUERY)),
        }
    }

    pub fn size(&self) -> Result<usize, DbError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.entries()?.is_empty())
    }

    /// Adds or replaces the value under `key`.
    pub fn insert(&mut self, key: &str, value: V) -> Result<(), DbError> {
        match self {
            PersistedMap::Unmanaged(values) => {
                values.insert(key.to_string(), value);
                Ok(())
            }
            PersistedMap::Managed { obj, col } => obj.update_cell(*col, |cell| {
                let entries = match cell {
                    Value::Dictionary(entries) => entries,
                    _ => {
                        *cell = Value::Dictionary(Vec::new());
                        match cell {
                            Value::Dictionary(entries) => entries,
                            _ => unreachable!(),
                        }
                    }
                };
                match entries.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
                    Ok(position) => {
                        entries[position].1 = value.to_value();
                        Ok(vec![CollOp::Modify(position)])
                    }
                    Err(position) => {
                        entries.insert(position, (key.to_string(), value.to_value()));
                        Ok(vec![CollOp::Insert(position)])
                    }
                }
            }),
            PersistedMap::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<V>, DbError> {
        self.entries()?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| V::from_value(v))
            .transpose()
    }

    /// The dual-mode accessor for one key: read/write when managed, a
    /// value-for-key predicate builder under capture.
    pub fn at(&self, key: &str) -> Result<MapBox<V>, DbError> {
        let target = match self {
            PersistedMap::Managed { obj, col } => BoxTarget::Managed { obj: obj.clone(), col: *col },
            PersistedMap::Capture { col } => BoxTarget::Capture { col: *col },
            PersistedMap::Unmanaged(_) => {
                return Err(DbError::Custom("Use `get`/`insert` on an unmanaged dictionary".into()))
            }
        };
        Ok(MapBox { target, key: key.to_string(), _marker: PhantomData })
    }

    /// Removes the entry under `key`; an absent key is a no-op returning
    /// false.
    pub fn erase(&mut self, key: &str) -> Result<bool, DbError> {
        match self {
            PersistedMap::Unmanaged(values) => Ok(values.remove(key).is_some()),
            PersistedMap::Managed { obj, col } => {
                let mut erased = false;
                obj.update_cell(*col, |cell| match cell {
                    Value::Dictionary(entries) => match entries.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
                        Ok(position) => {
                            entries.remove(position);
                            erased = true;
                            Ok(vec![CollOp::Delete(position)])
                        }
                        Err(_) => Ok(Vec::new()),
                    },
                    _ => Ok(Vec::new()),
                })?;
                Ok(erased)
            }
            PersistedMap::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    pub fn find(&self, key: &str) -> Result<Option<(String, V)>, DbError> {
        self.entries()?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(k, v)| Ok((k, V::from_value(v)?)))
            .transpose()
    }

    pub fn keys(&self) -> Result<Vec<String>, DbError> {
        Ok(self.entries()?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn clear(&mut self) -> Result<(), DbError> {
        match self {
            PersistedMap::Unmanaged(values) => {
                values.clear();
                Ok(())
            }
            PersistedMap::Managed { obj, col } => obj.update_cell(*col, |cell| match cell {
                Value::Dictionary(entries) => {
                    let ops = (0..entries.len()).rev().map(CollOp::Delete).collect();
                    entries.clear();
                    Ok(ops)
                }
                _ => Ok(Vec::new()),
            }),
            PersistedMap::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    /// Snapshot iteration in key order.
    pub fn iter(&self) -> Result<impl Iterator<Item = (String, V)>, DbError> {
        let entries: Vec<(String, V)> = self
            .entries()?
            .into_iter()
            .map(|(k, v)| Ok((k, V::from_value(v)?)))
            .collect::<Result<_, DbError>>()?;
        Ok(entries.into_iter())
    }

    pub fn detach(&self) -> Result<BTreeMap<String, V>, DbError> {
        self.iter().map(|entries| entries.collect())
    }

    /// Key-membership predicate; a query leaf under capture.
    pub fn contains_key(&self, key: &str) -> Rbool {
        match self {
            PersistedMap::Capture { col } => {
                Rbool::Expr(QueryNode::DictHasKey { col: *col, key: key.to_string() })
            }
            _ => match self.entries() {
                Ok(entries) => Rbool::Concrete(entries.iter().any(|(k, _)| k == key)),
                Err(_) => Rbool::Invalid(READ_IN_QUERY),
            },
        }
    }

    pub fn empty(&self) -> Rbool {
        match self {
            PersistedMap::Capture { col } => Rbool::Expr(QueryNode::Empty { col: *col }),
            _ => match self.entries() {
                Ok(entries) => Rbool::Concrete(entries.is_empty()),
                Err(_) => Rbool::Invalid(READ_IN_QUERY),
            },
        }
    }

    pub fn observe(&self, cb: impl FnMut(CollectionChange) + Send + 'static) -> Result<NotificationToken, DbError> {
        match self {
            PersistedMap::Managed { obj, col } => obj.realm().register_observer(Observer::Collection {
                table: obj.get_table().name,
                key: obj.get_key(),
                col: *col,
                cb: Box::new(cb),
            }),
            _ => Err(DbError::Custom("Only managed collections can be observed".into())),
        }
    }
}

impl<V: PropertyValue> Default for PersistedMap<V> {
    fn default() -> Self {
        PersistedMap::Unmanaged(BTreeMap::new())
    }
}

impl<V: PropertyValue> From<BTreeMap<String, V>> for PersistedMap<V> {
    fn from(values: BTreeMap<String, V>) -> Self {
        PersistedMap::Unmanaged(values)
    }
}

#[derive(Clone, Debug)]
enum BoxTarget {
    Managed { obj: Obj, col: ColKey },
    Capture { col: ColKey },
}

/// Accessor for one dictionary slot, handed out by `PersistedMap::at`.
#[derive(Clone, Debug)]
pub struct MapBox<V: PropertyValue> {
    target: BoxTarget,
    key: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V: PropertyValue> MapBox<V> {
    pub fn get(&self) -> Result<Option<V>, DbError> {
        match &self.target {
            BoxTarget::Managed { obj, col } => match obj.get_value(*col)? {
                Value::Dictionary(entries) => entries
                    .into_iter()
                    .find(|(k, _)| *k == self.key)
                    .map(|(_, v)| V::from_value(v))
                    .transpose(),
                _ => Ok(None),
            },
            BoxTarget::Capture { .. } => Err(DbError::QueryMisuse(READ_IN_QUERY)),
        }
    }

    pub fn set(&self, value: V) -> Result<(), DbError> {
        match &self.target {
            BoxTarget::Managed { obj, col } => {
                let key = self.key.clone();
                obj.update_cell(*col, |cell| {
                    let entries = match cell {
                        Value::Dictionary(entries) => entries,
                        _ => {
                            *cell = Value::Dictionary(Vec::new());
                            match cell {
                                Value::Dictionary(entries) => entries,
                                _ => unreachable!(),
                            }
                        }
                    };
                    match entries.binary_search_by(|(k, _)| k.as_str().cmp(key.as_str())) {
                        Ok(position) => {
                            entries[position].1 = value.to_value();
                            Ok(vec![CollOp::Modify(position)])
                        }
                        Err(position) => {
                            entries.insert(position, (key, value.to_value()));
                            Ok(vec![CollOp::Insert(position)])
                        }
                    }
                })
            }
            BoxTarget::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    fn compare(&self, op: CmpOp, rhs: V) -> Rbool {
        match &self.target {
            BoxTarget::Capture { col } => Rbool::Expr(QueryNode::DictCmp {
                col: *col,
                key: self.key.clone(),
                op,
                rhs: rhs.to_value(),
            }),
            BoxTarget::Managed { .. } => match self.get() {
                Ok(Some(lhs)) => Rbool::Concrete(compare_values(&lhs.to_value(), op, &rhs.to_value())),
                Ok(None) => Rbool::Concrete(false),
                Err(_) => Rbool::Invalid(READ_IN_QUERY),
            },
        }
    }

    pub fn eq(&self, rhs: impl Into<V>) -> Rbool {
        self.compare(CmpOp::Eq, rhs.into())
    }

    pub fn ne(&self, rhs: impl Into<V>) -> Rbool {
        self.compare(CmpOp::Ne, rhs.into())
    }

    pub fn lt(&self, rhs: impl Into<V>) -> Rbool {
        self.compare(CmpOp::Lt, rhs.into())
    }

    pub fn le(&self, rhs: impl Into<V>) -> Rbool {
        self.compare(CmpOp::Le, rhs.into())
    }

    pub fn gt(&self, rhs: impl Into<V>) -> Rbool {
        self.compare(CmpOp::Gt, rhs.into())
    }

    pub fn ge(&self, rhs: impl Into<V>) -> Rbool {
        self.compare(CmpOp::Ge, rhs.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmanaged_map_erase_is_total() {
        let mut map: PersistedMap<i64> = PersistedMap::default();
        map.insert("a", 1).unwrap();
        map.insert("b", 2).unwrap();
        assert_eq!(map.get("a").unwrap(), Some(1));
        assert!(map.erase("a").unwrap());
        assert!(!map.erase("a").unwrap());
        assert!(!map.erase("never-there").unwrap());
        assert_eq!(map.keys().unwrap(), vec!["b".to_string()]);
        assert_eq!(map.find("b").unwrap(), Some(("b".to_string(), 2)));
        assert_eq!(map.find("a").unwrap(), None);
    }

    #[test]
    fn capture_map_builds_keyed_predicates() {
        let map: PersistedMap<i64> = PersistedMap::capture(ColKey(4));
        assert!(matches!(map.contains_key("k"), Rbool::Expr(QueryNode::DictHasKey { .. })));
        let slot = map.at("k").unwrap();
        match slot.gt(3) {
            Rbool::Expr(QueryNode::DictCmp { key, op, .. }) => {
                assert_eq!(key, "k");
                assert_eq!(op, CmpOp::Gt);
            }
            other => panic!("expected a keyed predicate, got {:?}", other),
        }
    }
}
