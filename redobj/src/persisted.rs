use crate::error::DbError;
use crate::obj::Obj;
use crate::rbool::{CmpOp, QueryNode, Rbool};
use crate::schema::{ColKey, ManagedObject, Object, ObjectKind};
use crate::value::{PropertyValue, Value};
use std::marker::PhantomData;

const READ_IN_QUERY: &str = "Cannot read a property inside of `where`";
const WRITE_IN_QUERY: &str = "Cannot modify a property inside of `where`";
const READ_FAILED: &str = "Failed to read property value during comparison";

/// One field of one object instance: a plain value until the owning object is
/// persisted, a live database-backed accessor afterwards, and a predicate
/// builder while a `where` lambda runs.
#[derive(Clone, Debug)]
pub enum Persisted<V: PropertyValue> {
    Unmanaged(V),
    Managed { obj: Obj, col: ColKey },
    Capture { col: ColKey },
}

impl<V: PropertyValue> Persisted<V> {
    pub fn new(value: V) -> Self {
        Persisted::Unmanaged(value)
    }

    /// Binds this accessor to a persisted row. Rebinding replaces any prior
    /// state; the query-capture state is never persisted.
    pub fn assign(&mut self, obj: Obj, col: ColKey) {
        *self = Persisted::Managed { obj, col };
    }

    pub fn capture(col: ColKey) -> Self {
        Persisted::Capture { col }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, Persisted::Managed { .. })
    }

    /// Current value: the local one while unmanaged, the stored one (converted
    /// back from its canonical representation) while managed.
    pub fn get(&self) -> Result<V, DbError> {
        match self {
            Persisted::Unmanaged(v) => Ok(v.clone()),
            Persisted::Managed { obj, col } => {
                let value = obj.get_value(*col)?;
                if value.is_null() && !V::NULLABLE {
                    let name = obj.get_table().property(*col).map(|p| p.name).unwrap_or("?");
                    return Err(DbError::UnexpectedNull(name.to_string()));
                }
                V::from_value(value)
            }
            Persisted::Capture { .. } => Err(DbError::QueryMisuse(READ_IN_QUERY)),
        }
    }

    /// Stores locally while unmanaged; writes through in canonical form while
    /// managed, which requires an open write transaction.
    pub fn set(&mut self, value: V) -> Result<(), DbError> {
        match self {
            Persisted::Unmanaged(v) => {
                *v = value;
                Ok(())
            }
            Persisted::Managed { obj, col } => obj.set_value(*col, value.to_value()),
            Persisted::Capture { .. } => Err(DbError::QueryMisuse(WRITE_IN_QUERY)),
        }
    }

    fn compare(&self, op: CmpOp, rhs: V) -> Rbool {
        match self {
            Persisted::Capture { col } => Rbool::Expr(QueryNode::Cmp { col: *col, op, rhs: rhs.to_value() }),
            _ => match self.get() {
                Ok(lhs) => Rbool::Concrete(compare_values(&lhs.to_value(), op, &rhs.to_value())),
                Err(_) => Rbool::Invalid(READ_FAILED),
            },
        }
    }

    pub fn eq(&self, rhs: impl Into<V>) -> Rbool {
        self.compare(CmpOp::Eq, rhs.into())
    }

    pub fn ne(&self, rhs: impl Into<V>) -> Rbool {
        self.compare(CmpOp::Ne, rhs.into())
    }
}

impl<V: PropertyValue + PartialOrd> Persisted<V> {
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

pub(crate) fn compare_values(lhs: &Value, op: CmpOp, rhs: &Value) -> bool {
    use std::cmp::Ordering;
    match op {
        CmpOp::Eq => match (lhs.is_null(), rhs.is_null()) {
            (true, true) => true,
            (false, false) => lhs.compare(rhs) == Some(Ordering::Equal),
            _ => false,
        },
        CmpOp::Ne => !compare_values(lhs, CmpOp::Eq, rhs),
        CmpOp::Lt => lhs.compare(rhs) == Some(Ordering::Less),
        CmpOp::Le => matches!(lhs.compare(rhs), Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => lhs.compare(rhs) == Some(Ordering::Greater),
        CmpOp::Ge => matches!(lhs.compare(rhs), Some(Ordering::Greater | Ordering::Equal)),
    }
}

impl Persisted<String> {
    /// Substring match; a predicate leaf under query capture.
    pub fn contains(&self, needle: &str) -> Rbool {
        match self {
            Persisted::Capture { col } => {
                Rbool::Expr(QueryNode::Contains { col: *col, rhs: Value::String(needle.to_string()) })
            }
            _ => match self.get() {
                Ok(v) => Rbool::Concrete(v.contains(needle)),
                Err(_) => Rbool::Invalid(READ_FAILED),
            },
        }
    }
}

macro_rules! impl_numeric_assign {
    ($t:ty) => {
        impl Persisted<$t> {
            pub fn add_assign(&mut self, rhs: $t) -> Result<(), DbError> {
                let value = self.get()?;
                self.set(value + rhs)
            }

            pub fn sub_assign(&mut self, rhs: $t) -> Result<(), DbError> {
                let value = self.get()?;
                self.set(value - rhs)
            }

            pub fn mul_assign(&mut self, rhs: $t) -> Result<(), DbError> {
                let value = self.get()?;
                self.set(value * rhs)
            }
        }
    };
}

impl_numeric_assign!(i64);
impl_numeric_assign!(f64);
impl_numeric_assign!(crate::types::Decimal128);

impl Persisted<i64> {
    pub fn div_assign(&mut self, rhs: i64) -> Result<(), DbError> {
        let value = self.get()?;
        let quotient = value.checked_div(rhs).ok_or(DbError::DivisionByZero)?;
        self.set(quotient)
    }

    pub fn incr(&mut self) -> Result<(), DbError> {
        self.add_assign(1)
    }

    pub fn decr(&mut self) -> Result<(), DbError> {
        self.sub_assign(1)
    }
}

impl Persisted<f64> {
    pub fn div_assign(&mut self, rhs: f64) -> Result<(), DbError> {
        if rhs == 0.0 {
            return Err(DbError::DivisionByZero);
        }
        let value = self.get()?;
        self.set(value / rhs)
    }
}

impl Persisted<crate::types::Decimal128> {
    pub fn div_assign(&mut self, rhs: crate::types::Decimal128) -> Result<(), DbError> {
        let value = self.get()?;
        let quotient = value.checked_div(rhs).ok_or(DbError::DivisionByZero)?;
        self.set(quotient)
    }
}

impl<V: PropertyValue + Default> Default for Persisted<V> {
    fn default() -> Self {
        Persisted::Unmanaged(V::default())
    }
}

impl<V: PropertyValue> From<V> for Persisted<V> {
    fn from(value: V) -> Self {
        Persisted::Unmanaged(value)
    }
}

/// Accessor for the primary-key property: readable and comparable, never
/// mutable once the object is persisted.
#[derive(Clone, Debug)]
pub struct PersistedKey<V: PropertyValue> {
    obj: Option<Obj>,
    col: ColKey,
    _marker: PhantomData<fn() -> V>,
}

impl<V: PropertyValue> PersistedKey<V> {
    pub fn bound(obj: Obj, col: ColKey) -> Self {
        PersistedKey { obj: Some(obj), col, _marker: PhantomData }
    }

    pub fn capture(col: ColKey) -> Self {
        PersistedKey { obj: None, col, _marker: PhantomData }
    }

    pub fn get(&self) -> Result<V, DbError> {
        match &self.obj {
            Some(obj) => V::from_value(obj.get_value(self.col)?),
            None => Err(DbError::QueryMisuse(READ_IN_QUERY)),
        }
    }

    fn compare(&self, op: CmpOp, rhs: V) -> Rbool {
        match &self.obj {
            None => Rbool::Expr(QueryNode::Cmp { col: self.col, op, rhs: rhs.to_value() }),
            Some(_) => match self.get() {
                Ok(lhs) => Rbool::Concrete(compare_values(&lhs.to_value(), op, &rhs.to_value())),
                Err(_) => Rbool::Invalid(READ_FAILED),
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

/// Nullable link to another object. Embedded targets are owned by the parent
/// row: replacing or clearing the link deletes the previous child.
#[derive(Clone, Debug)]
pub enum PersistedLink<T: Object> {
    Unmanaged(Option<T>),
    Managed { obj: Obj, col: ColKey },
    Capture { col: ColKey },
}

impl<T: Object> PersistedLink<T> {
    pub fn new(target: Option<T>) -> Self {
        PersistedLink::Unmanaged(target)
    }

    pub fn assign(&mut self, obj: Obj, col: ColKey) {
        *self = PersistedLink::Managed { obj, col };
    }

    pub fn capture(col: ColKey) -> Self {
        PersistedLink::Capture { col }
    }

    /// The managed target, lazily wrapped; `None` while the link is null.
    pub fn get(&self) -> Result<Option<T::Managed>, DbError> {
        match self {
            PersistedLink::Managed { obj, col } => Ok(obj.get_linked_object(*col)?.map(T::bind)),
            PersistedLink::Unmanaged(_) => {
                Err(DbError::Custom("An unmanaged link holds no managed target; persist the object first".into()))
            }
            PersistedLink::Capture { .. } => Err(DbError::QueryMisuse(READ_IN_QUERY)),
        }
    }

    pub fn set(&mut self, target: Option<T>) -> Result<(), DbError> {
        match self {
            PersistedLink::Unmanaged(slot) => {
                *slot = target;
                Ok(())
            }
            PersistedLink::Managed { obj, col } => {
                if T::KIND == ObjectKind::Embedded {
                    if let Some(previous) = obj.get_linked_object(*col)? {
                        previous.realm().delete_row(previous.get_table(), previous.get_key())?;
                    }
                }
                match target {
                    None => obj.set_null(*col),
                    Some(child) => {
                        let child_obj = child.insert(obj.realm())?;
                        obj.set_value(
                            *col,
                            Value::Link { table: child_obj.get_table().name.to_string(), key: child_obj.get_key() },
                        )
                    }
                }
            }
            PersistedLink::Capture { .. } => Err(DbError::QueryMisuse(WRITE_IN_QUERY)),
        }
    }

    pub fn is_none(&self) -> Rbool {
        match self {
            PersistedLink::Capture { col } => Rbool::Expr(QueryNode::LinksTo { col: *col, target: None }),
            PersistedLink::Unmanaged(slot) => Rbool::Concrete(slot.is_none()),
            PersistedLink::Managed { obj, col } => match obj.is_null(*col) {
                Ok(null) => Rbool::Concrete(null),
                Err(_) => Rbool::Invalid(READ_FAILED),
            },
        }
    }

    pub fn is_some(&self) -> Rbool {
        !self.is_none()
    }

    /// Link identity comparison against an already-managed object.
    pub fn links_to(&self, target: &T::Managed) -> Rbool {
        let handle = match target.object_handle() {
            Some(handle) => handle,
            None => return Rbool::Invalid("The right-hand side of a link comparison is a `where` proxy"),
        };
        match self {
            PersistedLink::Capture { col } => Rbool::Expr(QueryNode::LinksTo {
                col: *col,
                target: Some((handle.get_table().name.to_string(), handle.get_key())),
            }),
            PersistedLink::Managed { obj, col } => match obj.get_linked_object(*col) {
                Ok(Some(linked)) => Rbool::Concrete(linked.same_row(handle)),
                Ok(None) => Rbool::Concrete(false),
                Err(_) => Rbool::Invalid(READ_FAILED),
            },
            PersistedLink::Unmanaged(_) => Rbool::Concrete(false),
        }
    }
}

impl<T: Object> Default for PersistedLink<T> {
    fn default() -> Self {
        PersistedLink::Unmanaged(None)
    }
}

impl<T: Object> From<Option<T>> for PersistedLink<T> {
    fn from(target: Option<T>) -> Self {
        PersistedLink::Unmanaged(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmanaged_accessor_behaves_as_a_value() {
        let mut age: Persisted<i64> = Persisted::new(30);
        assert_eq!(age.get().unwrap(), 30);
        age.set(31).unwrap();
        age.add_assign(4).unwrap();
        assert_eq!(age.get().unwrap(), 35);
        assert_eq!(age.eq(35).value(), Some(true));
        assert_eq!(age.gt(40).value(), Some(false));
    }

    #[test]
    fn capture_accessor_builds_leaf_predicates() {
        let name: Persisted<String> = Persisted::capture(ColKey(1));
        match name.eq("John") {
            Rbool::Expr(QueryNode::Cmp { col, op, rhs }) => {
                assert_eq!(col, ColKey(1));
                assert_eq!(op, CmpOp::Eq);
                assert_eq!(rhs, Value::String("John".into()));
            }
            other => panic!("expected a leaf predicate, got {:?}", other),
        }
        assert!(matches!(name.contains("Jo"), Rbool::Expr(QueryNode::Contains { .. })));
    }

    #[test]
    fn division_by_zero_is_recoverable() {
        let mut count: Persisted<i64> = Persisted::new(10);
        assert!(matches!(count.div_assign(0), Err(DbError::DivisionByZero)));
        assert_eq!(count.get().unwrap(), 10);
        count.div_assign(2).unwrap();
        assert_eq!(count.get().unwrap(), 5);

        let mut ratio: Persisted<f64> = Persisted::new(1.5);
        assert!(matches!(ratio.div_assign(0.0), Err(DbError::DivisionByZero)));

        let mut price: Persisted<crate::types::Decimal128> =
            Persisted::new(crate::types::Decimal128::from(5));
        let err = price.div_assign(crate::types::Decimal128::default()).unwrap_err();
        assert!(matches!(err, DbError::DivisionByZero));
    }

    #[test]
    fn optional_comparison_against_none() {
        let opt: Persisted<Option<i64>> = Persisted::new(None);
        assert_eq!(opt.eq(None).value(), Some(true));
        let opt: Persisted<Option<i64>> = Persisted::new(Some(3));
        assert_eq!(opt.ne(None).value(), Some(true));
    }
}
