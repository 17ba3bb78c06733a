use crate::error::DbError;
use crate::notifications::{CollOp, CollectionChange, NotificationToken, Observer};
use crate::obj::Obj;
use crate::rbool::{QueryNode, Rbool};
use crate::schema::ColKey;
use crate::value::{PropertyValue, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

const MUTATE_IN_QUERY: &str = "Cannot modify a collection inside of `where`";
const READ_IN_QUERY: &str = "Cannot read a collection inside of `where`";

fn order(a: &Value, b: &Value) -> Ordering {
    a.compare(b).unwrap_or(Ordering::Equal)
}

/// Unordered collection of distinct scalar values. The stored form keeps
/// elements sorted so membership checks and change indices are stable.
#[derive(Clone, Debug)]
pub enum PersistedSet<V: PropertyValue + Ord> {
    Unmanaged(BTreeSet<V>),
    Managed { obj: Obj, col: ColKey },
    Capture { col: ColKey },
}

impl<V: PropertyValue + Ord> PersistedSet<V> {
    pub fn new(values: BTreeSet<V>) -> Self {
        PersistedSet::Unmanaged(values)
    }

    pub fn assign(&mut self, obj: Obj, col: ColKey) {
        *self = PersistedSet::Managed { obj, col };
    }

    pub fn capture(col: ColKey) -> Self {
        PersistedSet::Capture { col }
    }

    fn items(&self) -> Result<Vec<Value>, DbError> {
        match self {
            PersistedSet::Unmanaged(values) => Ok(values.iter().map(|v| v.to_value()).collect()),
            PersistedSet::Managed { obj, col } => match obj.get_value(*col)? {
                Value::Set(items) => Ok(items),
                Value::Null => Ok(Vec::new()),
                other => Err(DbError::SchemaMismatch(format!("expected set cell, got {:?}", other))),
            },
            PersistedSet::Capture { .. } => Err(DbError::QueryMisuse(READ_IN_QUERY)),
        }
    }

    pub fn size(&self) -> Result<usize, DbError> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.items()?.is_empty())
    }

    /// Adds an element; returns whether the set grew.
    pub fn insert(&mut self, value: V) -> Result<bool, DbError> {
        match self {
            PersistedSet::Unmanaged(values) => Ok(values.insert(value)),
            PersistedSet::Managed { obj, col } => {
                let mut inserted = false;
                obj.update_cell(*col, |cell| {
                    let items = match cell {
                        Value::Set(items) => items,
                        _ => {
                            *cell = Value::Set(Vec::new());
                            match cell {
                                Value::Set(items) => items,
                                _ => unreachable!(),
                            }
                        }
                    };
                    let element = value.to_value();
                    match items.binary_search_by(|item| order(item, &element)) {
                        Ok(_) => Ok(Vec::new()),
                        Err(position) => {
                            items.insert(position, element);
                            inserted = true;
                            Ok(vec![CollOp::Insert(position)])
                        }
                    }
                })?;
                Ok(inserted)
            }
            PersistedSet::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    /// Removes an element; absent elements are a no-op returning false.
    pub fn erase(&mut self, value: &V) -> Result<bool, DbError> {
        match self {
            PersistedSet::Unmanaged(values) => Ok(values.remove(value)),
            PersistedSet::Managed { obj, col } => {
                let mut erased = false;
                obj.update_cell(*col, |cell| match cell {
                    Value::Set(items) => {
                        let element = value.to_value();
                        match items.binary_search_by(|item| order(item, &element)) {
                            Ok(position) => {
                                items.remove(position);
                                erased = true;
                                Ok(vec![CollOp::Delete(position)])
                            }
                            Err(_) => Ok(Vec::new()),
                        }
                    }
                    _ => Ok(Vec::new()),
                })?;
                Ok(erased)
            }
            PersistedSet::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    pub fn contains_value(&self, value: &V) -> Result<bool, DbError> {
        let needle = value.to_value();
        Ok(self.items()?.iter().any(|item| item.compare(&needle) == Some(Ordering::Equal)))
    }

    pub fn clear(&mut self) -> Result<(), DbError> {
        match self {
            PersistedSet::Unmanaged(values) => {
                values.clear();
                Ok(())
            }
            PersistedSet::Managed { obj, col } => obj.update_cell(*col, |cell| match cell {
                Value::Set(items) => {
                    let ops = (0..items.len()).rev().map(CollOp::Delete).collect();
                    items.clear();
                    Ok(ops)
                }
                _ => Ok(Vec::new()),
            }),
            PersistedSet::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    /// Snapshot iteration in element order.
    pub fn iter(&self) -> Result<impl Iterator<Item = V>, DbError> {
        let values: Vec<V> = self.items()?.into_iter().map(V::from_value).collect::<Result<_, _>>()?;
        Ok(values.into_iter())
    }

    pub fn detach(&self) -> Result<BTreeSet<V>, DbError> {
        self.iter().map(|values| values.collect())
    }

    /// Membership predicate; a query leaf under capture.
    pub fn contains(&self, value: impl Into<V>) -> Rbool {
        let needle = value.into().to_value();
        match self {
            PersistedSet::Capture { col } => Rbool::Expr(QueryNode::Contains { col: *col, rhs: needle }),
            _ => match self.items() {
                Ok(items) => {
                    Rbool::Concrete(items.iter().any(|item| item.compare(&needle) == Some(Ordering::Equal)))
                }
                Err(_) => Rbool::Invalid(READ_IN_QUERY),
            },
        }
    }

    pub fn empty(&self) -> Rbool {
        match self {
            PersistedSet::Capture { col } => Rbool::Expr(QueryNode::Empty { col: *col }),
            _ => match self.items() {
                Ok(items) => Rbool::Concrete(items.is_empty()),
                Err(_) => Rbool::Invalid(READ_IN_QUERY),
            },
        }
    }

    pub fn observe(&self, cb: impl FnMut(CollectionChange) + Send + 'static) -> Result<NotificationToken, DbError> {
        match self {
            PersistedSet::Managed { obj, col } => obj.realm().register_observer(Observer::Collection {
                table: obj.get_table().name,
                key: obj.get_key(),
                col: *col,
                cb: Box::new(cb),
            }),
            _ => Err(DbError::Custom("Only managed collections can be observed".into())),
        }
    }
}

impl<V: PropertyValue + Ord> Default for PersistedSet<V> {
    fn default() -> Self {
        PersistedSet::Unmanaged(BTreeSet::new())
    }
}

impl<V: PropertyValue + Ord> From<BTreeSet<V>> for PersistedSet<V> {
    fn from(values: BTreeSet<V>) -> Self {
        PersistedSet::Unmanaged(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmanaged_set_deduplicates_and_erases() {
        let mut set: PersistedSet<i64> = PersistedSet::default();
        assert!(set.insert(2).unwrap());
        assert!(set.insert(1).unwrap());
        assert!(!set.insert(2).unwrap());
        assert_eq!(set.size().unwrap(), 2);
        assert!(set.erase(&1).unwrap());
        assert!(!set.erase(&1).unwrap());
        assert!(set.contains_value(&2).unwrap());
    }

    #[test]
    fn capture_set_builds_predicates() {
        let set: PersistedSet<String> = PersistedSet::capture(ColKey(3));
        assert!(matches!(set.contains("a"), Rbool::Expr(QueryNode::Contains { .. })));
        assert!(matches!(set.empty(), Rbool::Expr(QueryNode::Empty { .. })));
    }
}
