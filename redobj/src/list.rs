use crate::error::DbError;
use crate::notifications::{CollOp, CollectionChange, NotificationToken, Observer};
use crate::obj::Obj;
use crate::rbool::{QueryNode, Rbool};
use crate::schema::{ColKey, ManagedObject, Object, ObjectKind};
use crate::value::{PropertyValue, Value};
use std::cmp::Ordering;

const MUTATE_IN_QUERY: &str = "Cannot modify a collection inside of `where`";
const READ_IN_QUERY: &str = "Cannot read a collection inside of `where`";

fn cell_items(obj: &Obj, col: ColKey) -> Result<Vec<Value>, DbError> {
    match obj.get_value(col)? {
        Value::List(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(DbError::SchemaMismatch(format!("expected list cell, got {:?}", other))),
    }
}

/// Ordered collection of scalar values, dual-mode like `Persisted`.
#[derive(Clone, Debug)]
pub enum PersistedList<V: PropertyValue> {
    Unmanaged(Vec<V>),
    Managed { obj: Obj, col: ColKey },
    Capture { col: ColKey },
}

impl<V: PropertyValue> PersistedList<V> {
    pub fn new(values: Vec<V>) -> Self {
        PersistedList::Unmanaged(values)
    }

    pub fn assign(&mut self, obj: Obj, col: ColKey) {
        *self = PersistedList::Managed { obj, col };
    }

    pub fn capture(col: ColKey) -> Self {
        PersistedList::Capture { col }
    }

    fn items(&self) -> Result<Vec<Value>, DbError> {
        match self {
            PersistedList::Unmanaged(values) => Ok(values.iter().map(|v| v.to_value()).collect()),
            PersistedList::Managed { obj, col } => cell_items(obj, *col),
            PersistedList::Capture { .. } => Err(DbError::QueryMisuse(READ_IN_QUERY)),
        }
    }

    fn mutate(
        &mut self,
        unmanaged: impl FnOnce(&mut Vec<V>) -> Result<(), DbError>,
        managed: impl FnOnce(&mut Vec<Value>) -> Result<Vec<CollOp>, DbError>,
    ) -> Result<(), DbError> {
        match self {
            PersistedList::Unmanaged(values) => unmanaged(values),
            PersistedList::Managed { obj, col } => obj.update_cell(*col, |cell| {
                let items = match cell {
                    Value::List(items) => items,
                    _ => {
                        *cell = Value::List(Vec::new());
                        match cell {
                            Value::List(items) => items,
                            _ => unreachable!(),
                        }
                    }
                };
                managed(items)
            }),
            PersistedList::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    pub fn size(&self) -> Result<usize, DbError> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.items()?.is_empty())
    }

    pub fn get(&self, index: usize) -> Result<V, DbError> {
        let items = self.items()?;
        let size = items.len();
        items
            .into_iter()
            .nth(index)
            .ok_or(DbError::OutOfBounds { index, size })
            .and_then(V::from_value)
    }

    pub fn push_back(&mut self, value: V) -> Result<(), DbError> {
        self.mutate(
            |values| {
                values.push(value.clone());
                Ok(())
            },
            |items| {
                items.push(value.to_value());
                Ok(vec![CollOp::Insert(items.len() - 1)])
            },
        )
    }

    pub fn pop_back(&mut self) -> Result<Option<V>, DbError> {
        match self {
            PersistedList::Unmanaged(values) => Ok(values.pop()),
            _ => {
                let items = self.items()?;
                match items.last() {
                    None => Ok(None),
                    Some(last) => {
                        let value = V::from_value(last.clone())?;
                        self.erase(items.len() - 1)?;
                        Ok(Some(value))
                    }
                }
            }
        }
    }

    pub fn insert(&mut self, index: usize, value: V) -> Result<(), DbError> {
        self.mutate(
            |values| {
                if index > values.len() {
                    return Err(DbError::OutOfBounds { index, size: values.len() });
                }
                values.insert(index, value.clone());
                Ok(())
            },
            |items| {
                if index > items.len() {
                    return Err(DbError::OutOfBounds { index, size: items.len() });
                }
                items.insert(index, value.to_value());
                Ok(vec![CollOp::Insert(index)])
            },
        )
    }

    pub fn set(&mut self, index: usize, value: V) -> Result<(), DbError> {
        self.mutate(
            |values| {
                if index >= values.len() {
                    return Err(DbError::OutOfBounds { index, size: values.len() });
                }
                values[index] = value.clone();
                Ok(())
            },
            |items| {
                if index >= items.len() {
                    return Err(DbError::OutOfBounds { index, size: items.len() });
                }
                items[index] = value.to_value();
                Ok(vec![CollOp::Modify(index)])
            },
        )
    }

    pub fn erase(&mut self, index: usize) -> Result<(), DbError> {
        self.mutate(
            |values| {
                if index >= values.len() {
                    return Err(DbError::OutOfBounds { index, size: values.len() });
                }
                values.remove(index);
                Ok(())
            },
            |items| {
                if index >= items.len() {
                    return Err(DbError::OutOfBounds { index, size: items.len() });
                }
                items.remove(index);
                Ok(vec![CollOp::Delete(index)])
            },
        )
    }

    pub fn find(&self, value: &V) -> Result<Option<usize>, DbError> {
        let needle = value.to_value();
        Ok(self.items()?.iter().position(|item| item.compare(&needle) == Some(Ordering::Equal)))
    }

    pub fn sort(&mut self, ascending: bool) -> Result<(), DbError> {
        self.mutate(
            |values| {
                values.sort_by(|a, b| {
                    let ord = a.to_value().compare(&b.to_value()).unwrap_or(Ordering::Equal);
                    if ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                });
                Ok(())
            },
            |items| {
                items.sort_by(|a, b| {
                    let ord = a.compare(b).unwrap_or(Ordering::Equal);
                    if ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                });
                Ok((0..items.len()).map(CollOp::Modify).collect())
            },
        )
    }

    pub fn clear(&mut self) -> Result<(), DbError> {
        self.mutate(
            |values| {
                values.clear();
                Ok(())
            },
            |items| {
                let ops = (0..items.len()).rev().map(CollOp::Delete).collect();
                items.clear();
                Ok(ops)
            },
        )
    }

    /// Snapshot iteration; call again to restart from the current contents.
    pub fn iter(&self) -> Result<impl Iterator<Item = V>, DbError> {
        let values: Vec<V> = self.items()?.into_iter().map(V::from_value).collect::<Result<_, _>>()?;
        Ok(values.into_iter())
    }

    pub fn detach(&self) -> Result<Vec<V>, DbError> {
        self.iter().map(|values| values.collect())
    }

    /// Membership predicate; a query leaf under capture.
    pub fn contains(&self, value: impl Into<V>) -> Rbool {
        let needle = value.into().to_value();
        match self {
            PersistedList::Capture { col } => Rbool::Expr(QueryNode::Contains { col: *col, rhs: needle }),
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
            PersistedList::Capture { col } => Rbool::Expr(QueryNode::Empty { col: *col }),
            _ => match self.items() {
                Ok(items) => Rbool::Concrete(items.is_empty()),
                Err(_) => Rbool::Invalid(READ_IN_QUERY),
            },
        }
    }

    pub fn observe(&self, cb: impl FnMut(CollectionChange) + Send + 'static) -> Result<NotificationToken, DbError> {
        match self {
            PersistedList::Managed { obj, col } => obj.realm().register_observer(Observer::Collection {
                table: obj.get_table().name,
                key: obj.get_key(),
                col: *col,
                cb: Box::new(cb),
            }),
            _ => Err(DbError::Custom("Only managed collections can be observed".into())),
        }
    }
}

impl<V: PropertyValue> Default for PersistedList<V> {
    fn default() -> Self {
        PersistedList::Unmanaged(Vec::new())
    }
}

impl<V: PropertyValue> From<Vec<V>> for PersistedList<V> {
    fn from(values: Vec<V>) -> Self {
        PersistedList::Unmanaged(values)
    }
}

/// Ordered collection of links to other objects. Pushing persists the target
/// first; erasing an embedded target deletes its row, since embedded children
/// live and die with their parent.
#[derive(Clone, Debug)]
pub enum PersistedObjectList<T: Object> {
    Unmanaged(Vec<T>),
    Managed { obj: Obj, col: ColKey },
    Capture { col: ColKey },
}

impl<T: Object> PersistedObjectList<T> {
    pub fn new(values: Vec<T>) -> Self {
        PersistedObjectList::Unmanaged(values)
    }

    pub fn assign(&mut self, obj: Obj, col: ColKey) {
        *self = PersistedObjectList::Managed { obj, col };
    }

    pub fn capture(col: ColKey) -> Self {
        PersistedObjectList::Capture { col }
    }

    fn links(&self) -> Result<Vec<(String, u64)>, DbError> {
        match self {
            PersistedObjectList::Managed { obj, col } => cell_items(obj, *col)?
                .into_iter()
                .map(|item| match item {
                    Value::Link { table, key } => Ok((table, key)),
                    other => Err(DbError::SchemaMismatch(format!("expected link element, got {:?}", other))),
                })
                .collect(),
            PersistedObjectList::Unmanaged(_) => {
                Err(DbError::Custom("An unmanaged object list holds no managed targets; persist the parent first".into()))
            }
            PersistedObjectList::Capture { .. } => Err(DbError::QueryMisuse(READ_IN_QUERY)),
        }
    }

    pub fn size(&self) -> Result<usize, DbError> {
        match self {
            PersistedObjectList::Unmanaged(values) => Ok(values.len()),
            _ => Ok(self.links()?.len()),
        }
    }

    pub fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.size()? == 0)
    }

    pub fn push(&mut self, value: T) -> Result<(), DbError> {
        match self {
            PersistedObjectList::Unmanaged(values) => {
                values.push(value);
                Ok(())
            }
            PersistedObjectList::Managed { obj, col } => {
                let child = value.insert(obj.realm())?;
                let link = Value::Link { table: child.get_table().name.to_string(), key: child.get_key() };
                obj.update_cell(*col, |cell| match cell {
                    Value::List(items) => {
                        items.push(link);
                        Ok(vec![CollOp::Insert(items.len() - 1)])
                    }
                    _ => {
                        *cell = Value::List(vec![link]);
                        Ok(vec![CollOp::Insert(0)])
                    }
                })
            }
            PersistedObjectList::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    pub fn get(&self, index: usize) -> Result<T::Managed, DbError> {
        let links = self.links()?;
        let size = links.len();
        let (_, key) = links.into_iter().nth(index).ok_or(DbError::OutOfBounds { index, size })?;
        let obj = match self {
            PersistedObjectList::Managed { obj, .. } => obj,
            _ => unreachable!(),
        };
        Ok(T::bind(Obj::new(obj.realm().clone(), T::schema(), key)))
    }

    pub fn erase(&mut self, index: usize) -> Result<(), DbError> {
        match self {
            PersistedObjectList::Unmanaged(values) => {
                if index >= values.len() {
                    return Err(DbError::OutOfBounds { index, size: values.len() });
                }
                values.remove(index);
                Ok(())
            }
            PersistedObjectList::Managed { obj, col } => {
                let mut removed: Option<u64> = None;
                obj.update_cell(*col, |cell| match cell {
                    Value::List(items) => {
                        if index >= items.len() {
                            return Err(DbError::OutOfBounds { index, size: items.len() });
                        }
                        if let Value::Link { key, .. } = items.remove(index) {
                            removed = Some(key);
                        }
                        Ok(vec![CollOp::Delete(index)])
                    }
                    _ => Err(DbError::OutOfBounds { index, size: 0 }),
                })?;
                if T::KIND == ObjectKind::Embedded {
                    if let Some(key) = removed {
                        obj.realm().delete_row(T::schema(), key)?;
                    }
                }
                Ok(())
            }
            PersistedObjectList::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    pub fn find(&self, target: &T::Managed) -> Result<Option<usize>, DbError> {
        let handle = match target.object_handle() {
            Some(handle) => handle,
            None => return Err(DbError::QueryMisuse(READ_IN_QUERY)),
        };
        Ok(self
            .links()?
            .iter()
            .position(|(table, key)| *table == handle.get_table().name && *key == handle.get_key()))
    }

    pub fn clear(&mut self) -> Result<(), DbError> {
        match self {
            PersistedObjectList::Unmanaged(values) => {
                values.clear();
                Ok(())
            }
            PersistedObjectList::Managed { obj, col } => {
                let mut removed: Vec<u64> = Vec::new();
                obj.update_cell(*col, |cell| match cell {
                    Value::List(items) => {
                        let ops = (0..items.len()).rev().map(CollOp::Delete).collect();
                        for item in items.drain(..) {
                            if let Value::Link { key, .. } = item {
                                removed.push(key);
                            }
                        }
                        Ok(ops)
                    }
                    _ => Ok(Vec::new()),
                })?;
                if T::KIND == ObjectKind::Embedded {
                    for key in removed {
                        obj.realm().delete_row(T::schema(), key)?;
                    }
                }
                Ok(())
            }
            PersistedObjectList::Capture { .. } => Err(DbError::QueryMisuse(MUTATE_IN_QUERY)),
        }
    }

    /// Snapshot iteration over lazily wrapped targets.
    pub fn iter(&self) -> Result<impl Iterator<Item = T::Managed>, DbError> {
        let (realm, links) = match self {
            PersistedObjectList::Managed { obj, .. } => (obj.realm().clone(), self.links()?),
            _ => return Err(DbError::QueryMisuse(READ_IN_QUERY)),
        };
        Ok(links
            .into_iter()
            .map(move |(_, key)| T::bind(Obj::new(realm.clone(), T::schema(), key))))
    }

    pub fn empty(&self) -> Rbool {
        match self {
            PersistedObjectList::Capture { col } => Rbool::Expr(QueryNode::Empty { col: *col }),
            PersistedObjectList::Unmanaged(values) => Rbool::Concrete(values.is_empty()),
            PersistedObjectList::Managed { .. } => match self.links() {
                Ok(links) => Rbool::Concrete(links.is_empty()),
                Err(_) => Rbool::Invalid(READ_IN_QUERY),
            },
        }
    }

    pub fn observe(&self, cb: impl FnMut(CollectionChange) + Send + 'static) -> Result<NotificationToken, DbError> {
        match self {
            PersistedObjectList::Managed { obj, col } => obj.realm().register_observer(Observer::Collection {
                table: obj.get_table().name,
                key: obj.get_key(),
                col: *col,
                cb: Box::new(cb),
            }),
            _ => Err(DbError::Custom("Only managed collections can be observed".into())),
        }
    }
}

impl<T: Object> Default for PersistedObjectList<T> {
    fn default() -> Self {
        PersistedObjectList::Unmanaged(Vec::new())
    }
}

impl<T: Object> From<Vec<T>> for PersistedObjectList<T> {
    fn from(values: Vec<T>) -> Self {
        PersistedObjectList::Unmanaged(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmanaged_list_mutation() {
        let mut list: PersistedList<i64> = PersistedList::new(vec![3, 1]);
        list.push_back(2).unwrap();
        list.sort(true).unwrap();
        assert_eq!(list.detach().unwrap(), vec![1, 2, 3]);
        assert_eq!(list.find(&2).unwrap(), Some(1));
        list.erase(0).unwrap();
        assert_eq!(list.size().unwrap(), 2);
        assert!(matches!(list.erase(5), Err(DbError::OutOfBounds { index: 5, size: 2 })));
        assert_eq!(list.pop_back().unwrap(), Some(3));
    }

    #[test]
    fn capture_list_builds_predicates() {
        let list: PersistedList<String> = PersistedList::capture(ColKey(2));
        assert!(matches!(list.contains("a"), Rbool::Expr(QueryNode::Contains { .. })));
        assert!(matches!(list.empty(), Rbool::Expr(QueryNode::Empty { .. })));
        let mut list = list;
        assert!(matches!(list.push_back("a".into()), Err(DbError::QueryMisuse(_))));
    }
}
