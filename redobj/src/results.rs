use crate::error::DbError;
use crate::notifications::{NotificationToken, Observer, ResultsChange};
use crate::obj::Obj;
use crate::query::{parse_query, run_query};
use crate::rbool::{QueryNode, Rbool};
use crate::realm::{fingerprint, Realm};
use crate::schema::{ColKey, Object};
use crate::value::{Row, Value};
use std::fmt;
use std::marker::PhantomData;

/// A live view over every object of one type matching a predicate. Nothing is
/// cached: each access re-runs the query against the session's current
/// snapshot, so results stay current on a live realm and pinned on a frozen
/// one.
pub struct Results<T: Object> {
    realm: Realm,
    node: QueryNode,
    sort: Option<(ColKey, bool)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Object> fmt::Debug for Results<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("table", &T::schema().name)
            .field("query", &self.node)
            .field("sort", &self.sort)
            .finish()
    }
}

impl<T: Object> Clone for Results<T> {
    fn clone(&self) -> Self {
        Results { realm: self.realm.clone(), node: self.node.clone(), sort: self.sort, _marker: PhantomData }
    }
}

impl<T: Object> Results<T> {
    pub(crate) fn new(realm: Realm) -> Results<T> {
        Results { realm, node: QueryNode::True, sort: None, _marker: PhantomData }
    }

    fn rows(&self) -> Result<Vec<(u64, Row)>, DbError> {
        self.realm.inner.with_view(|tx| run_query(tx, T::schema().name, &self.node, self.sort))
    }

    pub fn len(&self) -> Result<usize, DbError> {
        Ok(self.rows()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.rows()?.is_empty())
    }

    pub fn get(&self, index: usize) -> Result<T::Managed, DbError> {
        let rows = self.rows()?;
        let (key, _) = rows.get(index).ok_or(DbError::OutOfBounds { index, size: rows.len() })?;
        Ok(T::bind(Obj::new(self.realm.clone(), T::schema(), *key)))
    }

    /// Snapshot iteration; calling again restarts from the current results.
    pub fn iter(&self) -> Result<impl Iterator<Item = T::Managed>, DbError> {
        let realm = self.realm.clone();
        let keys: Vec<u64> = self.rows()?.into_iter().map(|(key, _)| key).collect();
        Ok(keys.into_iter().map(move |key| T::bind(Obj::new(realm.clone(), T::schema(), key))))
    }

    /// Narrows the result set with a typed predicate. The closure receives a
    /// query-capture proxy; comparisons on it build the predicate instead of
    /// reading values.
    pub fn filter(&self, f: impl FnOnce(&T::Managed) -> Rbool) -> Result<Results<T>, DbError> {
        let proxy = T::prepare_for_query();
        self.narrow(f(&proxy).into_node()?)
    }

    /// Narrows the result set with a realm query string, e.g.
    /// `"age > $0 && name CONTAINS $1"` with positional arguments.
    pub fn filter_str(&self, source: &str, args: &[Value]) -> Result<Results<T>, DbError> {
        self.narrow(parse_query(T::schema(), source, args)?)
    }

    fn narrow(&self, node: QueryNode) -> Result<Results<T>, DbError> {
        let combined = match &self.node {
            QueryNode::True => node,
            existing => QueryNode::And(Box::new(existing.clone()), Box::new(node)),
        };
        Ok(Results { realm: self.realm.clone(), node: combined, sort: self.sort, _marker: PhantomData })
    }

    pub fn sort(&self, property: &str, ascending: bool) -> Result<Results<T>, DbError> {
        let col = T::schema()
            .col_key(property)
            .ok_or_else(|| DbError::InvalidQuery(format!("`{}` is not a property of `{}`", property, T::schema().name)))?;
        Ok(Results { realm: self.realm.clone(), node: self.node.clone(), sort: Some((col, ascending)), _marker: PhantomData })
    }

    /// The same query pinned to an immutable snapshot of the session.
    pub fn freeze(&self) -> Result<Results<T>, DbError> {
        Ok(Results {
            realm: self.realm.freeze()?,
            node: self.node.clone(),
            sort: self.sort,
            _marker: PhantomData,
        })
    }

    /// Subscribes to membership and content changes of the matching set,
    /// delivered as index diffs after each committed write.
    pub fn observe(&self, cb: impl FnMut(ResultsChange) + Send + 'static) -> Result<NotificationToken, DbError> {
        // Change indices are tracked in key order, matching delivery.
        let last: Vec<(u64, u64)> = self
            .realm
            .inner
            .with_view(|tx| run_query(tx, T::schema().name, &self.node, None))?
            .iter()
            .map(|(key, row)| (*key, fingerprint(row)))
            .collect();
        self.realm.register_observer(Observer::Results {
            table: T::schema().name,
            node: self.node.clone(),
            last,
            cb: Box::new(cb),
        })
    }
}
