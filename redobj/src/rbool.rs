use crate::error::DbError;
use crate::schema::ColKey;
use crate::value::Value;
use std::ops::{BitAnd, BitOr, Not};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Predicate tree built by query-capture accessors and by the string
/// predicate parser. Compiled queries evaluate it row by row.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryNode {
    True,
    False,
    Cmp { col: ColKey, op: CmpOp, rhs: Value },
    Contains { col: ColKey, rhs: Value },
    Empty { col: ColKey },
    DictCmp { col: ColKey, key: String, op: CmpOp, rhs: Value },
    DictHasKey { col: ColKey, key: String },
    LinksTo { col: ColKey, target: Option<(String, u64)> },
    Not(Box<QueryNode>),
    And(Box<QueryNode>, Box<QueryNode>),
    Or(Box<QueryNode>, Box<QueryNode>),
}

pub(crate) const MIXED_MODE: &str = "Cannot mix a concrete bool with a query expression inside of `where`";

/// Result of a comparison on a property accessor: a plain boolean when the
/// accessor is live, a partially built query expression when it is in
/// query-capture mode. `&`/`|`/`!` combine either form; mixing the two forms
/// is rejected when the query is built.
#[derive(Clone, Debug)]
pub enum Rbool {
    Concrete(bool),
    Expr(QueryNode),
    Invalid(&'static str),
}

impl Rbool {
    /// Matches every object (TRUEPREDICATE).
    pub fn all() -> Rbool {
        Rbool::Expr(QueryNode::True)
    }

    /// Matches no object (FALSEPREDICATE).
    pub fn none() -> Rbool {
        Rbool::Expr(QueryNode::False)
    }

    /// The concrete outcome, if this comparison was evaluated immediately.
    pub fn value(&self) -> Option<bool> {
        match self {
            Rbool::Concrete(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn into_node(self) -> Result<QueryNode, DbError> {
        match self {
            Rbool::Expr(node) => Ok(node),
            Rbool::Concrete(true) => Ok(QueryNode::True),
            Rbool::Concrete(false) => Ok(QueryNode::False),
            Rbool::Invalid(msg) => Err(DbError::QueryMisuse(msg)),
        }
    }
}

impl From<bool> for Rbool {
    fn from(b: bool) -> Rbool {
        Rbool::Concrete(b)
    }
}

impl BitAnd for Rbool {
    type Output = Rbool;

    fn bitand(self, rhs: Rbool) -> Rbool {
        match (self, rhs) {
            (Rbool::Invalid(m), _) | (_, Rbool::Invalid(m)) => Rbool::Invalid(m),
            (Rbool::Expr(a), Rbool::Expr(b)) => Rbool::Expr(QueryNode::And(Box::new(a), Box::new(b))),
            (Rbool::Concrete(a), Rbool::Concrete(b)) => Rbool::Concrete(a && b),
            _ => Rbool::Invalid(MIXED_MODE),
        }
    }
}

impl BitOr for Rbool {
    type Output = Rbool;

    fn bitor(self, rhs: Rbool) -> Rbool {
        match (self, rhs) {
            (Rbool::Invalid(m), _) | (_, Rbool::Invalid(m)) => Rbool::Invalid(m),
            (Rbool::Expr(a), Rbool::Expr(b)) => Rbool::Expr(QueryNode::Or(Box::new(a), Box::new(b))),
            (Rbool::Concrete(a), Rbool::Concrete(b)) => Rbool::Concrete(a || b),
            _ => Rbool::Invalid(MIXED_MODE),
        }
    }
}

impl Not for Rbool {
    type Output = Rbool;

    fn not(self) -> Rbool {
        match self {
            Rbool::Concrete(b) => Rbool::Concrete(!b),
            Rbool::Expr(node) => Rbool::Expr(QueryNode::Not(Box::new(node))),
            invalid => invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(ix: u16, rhs: i64) -> Rbool {
        Rbool::Expr(QueryNode::Cmp { col: ColKey(ix), op: CmpOp::Eq, rhs: Value::Int(rhs) })
    }

    #[test]
    fn expressions_stay_expressions() {
        let combined = leaf(0, 1) & leaf(1, 2) | leaf(2, 3);
        match combined {
            Rbool::Expr(QueryNode::Or(lhs, _)) => {
                assert!(matches!(*lhs, QueryNode::And(_, _)));
            }
            other => panic!("expected Or at the root, got {:?}", other),
        }
    }

    #[test]
    fn concrete_or_is_a_real_or() {
        // Regression guard: `false || true` must be true.
        assert_eq!((Rbool::Concrete(false) | Rbool::Concrete(true)).value(), Some(true));
        assert_eq!((Rbool::Concrete(false) & Rbool::Concrete(true)).value(), Some(false));
    }

    #[test]
    fn mixing_modes_is_invalid() {
        let mixed = Rbool::Concrete(true) & leaf(0, 1);
        assert!(matches!(mixed, Rbool::Invalid(_)));
        let mixed = leaf(0, 1) | Rbool::Concrete(false);
        assert!(matches!(mixed.into_node(), Err(DbError::QueryMisuse(_))));
    }

    #[test]
    fn negation_wraps_expressions() {
        assert!(matches!(!leaf(0, 1), Rbool::Expr(QueryNode::Not(_))));
        assert_eq!((!Rbool::Concrete(true)).value(), Some(false));
    }
}
