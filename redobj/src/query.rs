use crate::error::DbError;
use crate::persisted::compare_values;
use crate::rbool::{CmpOp, QueryNode};
use crate::schema::{ColKey, ObjectSchema};
use crate::storage::{self, TxView};
use crate::value::{Row, Value};
use std::cmp::Ordering;

impl QueryNode {
    /// Evaluates this predicate against one decoded row.
    pub(crate) fn matches(&self, row: &Row) -> bool {
        match self {
            QueryNode::True => true,
            QueryNode::False => false,
            QueryNode::Cmp { col, op, rhs } => compare_values(&row[col.ix()], *op, rhs),
            QueryNode::Contains { col, rhs } => cell_contains(&row[col.ix()], rhs),
            QueryNode::Empty { col } => match &row[col.ix()] {
                Value::String(s) => s.is_empty(),
                Value::Binary(b) => b.is_empty(),
                Value::List(items) | Value::Set(items) => items.is_empty(),
                Value::Dictionary(entries) => entries.is_empty(),
                Value::Null => true,
                _ => false,
            },
            QueryNode::DictCmp { col, key, op, rhs } => match &row[col.ix()] {
                Value::Dictionary(entries) => entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| compare_values(v, *op, rhs))
                    .unwrap_or(false),
                _ => false,
            },
            QueryNode::DictHasKey { col, key } => match &row[col.ix()] {
                Value::Dictionary(entries) => entries.iter().any(|(k, _)| k == key),
                _ => false,
            },
            QueryNode::LinksTo { col, target } => match (&row[col.ix()], target) {
                (Value::Null, None) => true,
                (Value::Link { table, key }, Some((t, k))) => table == t && key == k,
                _ => false,
            },
            QueryNode::Not(inner) => !inner.matches(row),
            QueryNode::And(lhs, rhs) => lhs.matches(row) && rhs.matches(row),
            QueryNode::Or(lhs, rhs) => lhs.matches(row) || rhs.matches(row),
        }
    }
}

fn cell_contains(cell: &Value, rhs: &Value) -> bool {
    match cell {
        Value::String(s) => match rhs {
            Value::String(needle) => s.contains(needle.as_str()),
            _ => false,
        },
        Value::Binary(bytes) => match rhs {
            Value::Binary(needle) => {
                needle.is_empty() || bytes.windows(needle.len().max(1)).any(|w| w == needle.as_slice())
            }
            _ => false,
        },
        Value::List(items) | Value::Set(items) => {
            items.iter().any(|item| item.compare(rhs) == Some(Ordering::Equal))
        }
        Value::Dictionary(entries) => entries.iter().any(|(_, v)| v.compare(rhs) == Some(Ordering::Equal)),
        _ => false,
    }
}

/// Full-table scan filtered by `node`, in key order unless a sort column is
/// given. Every query in the crate funnels through here.
pub(crate) fn run_query(
    tx: &TxView<'_>,
    table: &str,
    node: &QueryNode,
    sort: Option<(ColKey, bool)>,
) -> Result<Vec<(u64, Row)>, DbError> {
    let mut rows: Vec<(u64, Row)> = storage::scan_rows(tx, table)?
        .into_iter()
        .filter(|(_, row)| node.matches(row))
        .collect();
    if let Some((col, ascending)) = sort {
        rows.sort_by(|(_, a), (_, b)| {
            let ord = a[col.ix()].compare(&b[col.ix()]).unwrap_or(Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
    }
    Ok(rows)
}

/// Parses the realm query-string form into the same predicate tree built by
/// the typed comparison API, e.g. `age > $0 && name CONTAINS 'Jo'`.
pub(crate) fn parse_query(schema: &ObjectSchema, source: &str, args: &[Value]) -> Result<QueryNode, DbError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { schema, tokens, pos: 0, args };
    let node = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(DbError::InvalidQuery(format!("unexpected trailing input in query `{}`", source)));
    }
    Ok(node)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    OrOr,
    AndAnd,
    Bang,
    LParen,
    RParen,
    Op(CmpOp),
    Contains,
    Empty(String),
    TruePredicate,
    FalsePredicate,
    Ident(String),
    Arg(usize),
    Literal(Value),
}

fn tokenize(source: &str) -> Result<Vec<Token>, DbError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' if bytes.get(i + 1) == Some(&b'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '&' if bytes.get(i + 1) == Some(&b'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '!' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            '=' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 2;
            }
            '<' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Op(CmpOp::Le));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op(CmpOp::Lt));
                i += 1;
            }
            '>' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Op(CmpOp::Ge));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(CmpOp::Gt));
                i += 1;
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start {
                    return Err(DbError::InvalidQuery("`$` must be followed by an argument index".into()));
                }
                let index: usize = source[start..end]
                    .parse()
                    .map_err(|_| DbError::InvalidQuery("argument index out of range".into()))?;
                tokens.push(Token::Arg(index));
                i = end;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] as char != quote {
                    end += 1;
                }
                if end == bytes.len() {
                    return Err(DbError::InvalidQuery("unterminated string literal".into()));
                }
                tokens.push(Token::Literal(Value::String(source[start..end].to_string())));
                i = end + 1;
            }
            '0'..='9' | '-' => {
                let start = i;
                let mut end = i + 1;
                let mut is_float = false;
                while end < bytes.len() {
                    match bytes[end] as char {
                        '0'..='9' => end += 1,
                        '.' if !is_float => {
                            is_float = true;
                            end += 1;
                        }
                        _ => break,
                    }
                }
                let text = &source[start..end];
                let literal = if is_float {
                    Value::Double(text.parse().map_err(|_| DbError::InvalidQuery(format!("bad number `{}`", text)))?)
                } else {
                    Value::Int(text.parse().map_err(|_| DbError::InvalidQuery(format!("bad number `{}`", text)))?)
                };
                tokens.push(Token::Literal(literal));
                i = end;
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut end = i;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                let word = &source[start..end];
                i = end;
                match word {
                    "CONTAINS" => tokens.push(Token::Contains),
                    "TRUEPREDICATE" => tokens.push(Token::TruePredicate),
                    "FALSEPREDICATE" => tokens.push(Token::FalsePredicate),
                    "NULL" => tokens.push(Token::Literal(Value::Null)),
                    "true" => tokens.push(Token::Literal(Value::Bool(true))),
                    "false" => tokens.push(Token::Literal(Value::Bool(false))),
                    _ => {
                        // `name.@empty` is one lexical unit.
                        if source[i..].starts_with(".@empty") {
                            i += ".@empty".len();
                            tokens.push(Token::Empty(word.to_string()));
                        } else {
                            tokens.push(Token::Ident(word.to_string()));
                        }
                    }
                }
            }
            _ => return Err(DbError::InvalidQuery(format!("unexpected character `{}` in query", c))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    schema: &'a ObjectSchema,
    tokens: Vec<Token>,
    pos: usize,
    args: &'a [Value],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, DbError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| DbError::InvalidQuery("unexpected end of query".into()))?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<QueryNode, DbError> {
        let mut node = self.and_expr()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and_expr()?;
            node = QueryNode::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn and_expr(&mut self) -> Result<QueryNode, DbError> {
        let mut node = self.unary_expr()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.unary_expr()?;
            node = QueryNode::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn unary_expr(&mut self) -> Result<QueryNode, DbError> {
        if self.eat(&Token::Bang) {
            return Ok(QueryNode::Not(Box::new(self.unary_expr()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<QueryNode, DbError> {
        match self.next()? {
            Token::LParen => {
                let node = self.or_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(DbError::InvalidQuery("expected `)`".into()));
                }
                Ok(node)
            }
            Token::TruePredicate => Ok(QueryNode::True),
            Token::FalsePredicate => Ok(QueryNode::False),
            Token::Empty(name) => Ok(QueryNode::Empty { col: self.resolve(&name)? }),
            Token::Ident(name) => {
                let col = self.resolve(&name)?;
                match self.next()? {
                    Token::Op(op) => Ok(QueryNode::Cmp { col, op, rhs: self.argument()? }),
                    Token::Contains => Ok(QueryNode::Contains { col, rhs: self.argument()? }),
                    other => Err(DbError::InvalidQuery(format!(
                        "expected a comparison operator after `{}`, got {:?}",
                        name, other
                    ))),
                }
            }
            other => Err(DbError::InvalidQuery(format!("unexpected token {:?}", other))),
        }
    }

    fn argument(&mut self) -> Result<Value, DbError> {
        match self.next()? {
            Token::Literal(value) => Ok(value),
            Token::Arg(index) => self
                .args
                .get(index)
                .cloned()
                .ok_or_else(|| DbError::InvalidQuery(format!("missing query argument ${}", index))),
            other => Err(DbError::InvalidQuery(format!("expected a literal or `$N`, got {:?}", other))),
        }
    }

    fn resolve(&self, name: &str) -> Result<ColKey, DbError> {
        self.schema
            .col_key(name)
            .ok_or_else(|| DbError::InvalidQuery(format!("`{}` is not a property of `{}`", name, self.schema.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ObjectKind, Property, PropertyKind};

    static PROPS: [Property; 3] = [
        Property { name: "_id", kind: PropertyKind::Int, nullable: false, primary_key: true },
        Property { name: "name", kind: PropertyKind::String, nullable: false, primary_key: false },
        Property { name: "age", kind: PropertyKind::Int, nullable: false, primary_key: false },
    ];

    fn person_schema() -> ObjectSchema {
        ObjectSchema { name: "Person", kind: ObjectKind::TopLevel, properties: &PROPS }
    }

    fn row(id: i64, name: &str, age: i64) -> Row {
        vec![Value::Int(id), Value::String(name.to_string()), Value::Int(age)]
    }

    #[test]
    fn parses_and_evaluates_conjunction() {
        let schema = person_schema();
        let node = parse_query(&schema, "_id == 123 && name != 'John'", &[]).unwrap();
        assert!(!node.matches(&row(123, "John", 30)));
        assert!(node.matches(&row(123, "Jane", 30)));
        assert!(!node.matches(&row(7, "Jane", 30)));
    }

    #[test]
    fn parses_disjunction_negation_and_parens() {
        let schema = person_schema();
        let node = parse_query(&schema, "!(age < 18) || name CONTAINS 'Jo'", &[]).unwrap();
        assert!(node.matches(&row(1, "Ann", 30)));
        assert!(node.matches(&row(2, "John", 10)));
        assert!(!node.matches(&row(3, "Ann", 10)));
    }

    #[test]
    fn positional_arguments_substitute_in_order() {
        let schema = person_schema();
        let args = [Value::Int(21), Value::String("Jo".into())];
        let node = parse_query(&schema, "age >= $0 && name CONTAINS $1", &args).unwrap();
        assert!(node.matches(&row(1, "John", 21)));
        assert!(!node.matches(&row(2, "John", 20)));
        assert!(!node.matches(&row(3, "Ann", 30)));
    }

    #[test]
    fn builtin_predicates_and_empty() {
        let schema = person_schema();
        assert_eq!(parse_query(&schema, "TRUEPREDICATE", &[]).unwrap(), QueryNode::True);
        assert_eq!(parse_query(&schema, "FALSEPREDICATE", &[]).unwrap(), QueryNode::False);
        let node = parse_query(&schema, "name.@empty", &[]).unwrap();
        assert!(node.matches(&row(1, "", 5)));
        assert!(!node.matches(&row(1, "x", 5)));
    }

    #[test]
    fn unknown_property_and_bad_syntax_are_rejected() {
        let schema = person_schema();
        assert!(matches!(parse_query(&schema, "height > 3", &[]), Err(DbError::InvalidQuery(_))));
        assert!(matches!(parse_query(&schema, "age >", &[]), Err(DbError::InvalidQuery(_))));
        assert!(matches!(parse_query(&schema, "age > $2", &[]), Err(DbError::InvalidQuery(_))));
        assert!(matches!(parse_query(&schema, "age > 1 garbage", &[]), Err(DbError::InvalidQuery(_))));
    }

    #[test]
    fn mixed_int_double_comparison_is_numeric() {
        let schema = person_schema();
        let node = parse_query(&schema, "age < 18.5", &[]).unwrap();
        assert!(node.matches(&row(1, "a", 18)));
        assert!(!node.matches(&row(1, "a", 19)));
    }
}
