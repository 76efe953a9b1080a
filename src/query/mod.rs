//! Query construction.
//!
//! Three styles are accepted and all of them end up as the same wire
//! `QuerySpec`:
//!
//! - raw query text: `Query::sql("SELECT * FROM Families f WHERE f.id = \"AndersenFamily\"")`
//! - declarative predicate: `Query::filter(Predicate::eq("id", "AndersenFamily"))`
//! - functional predicate: `Query::matching(|f| f.field("id").eq("AndersenFamily"))`

pub mod sql;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alias used when rendering predicates into query text.
const ROOT_ALIAS: &str = "r";

/// Named parameter bound into a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

/// Query text plus parameters, as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub query: String,
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// `SELECT * FROM root r WHERE r.id = @id`
    pub fn by_id(id: &str) -> Self {
        Query::filter(Predicate::eq("id", id)).to_spec()
    }
}

/// Structured filter over document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field at `path` equals `value`.
    Eq { path: Vec<String>, value: Value },
    /// Every inner predicate holds.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Equality on a top-level field. Dotted names address nested fields.
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            path: field.split('.').map(str::to_string).collect(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut inner) => {
                inner.push(other);
                Predicate::And(inner)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Evaluate against a document held in memory.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Predicate::Eq { path, value } => lookup(document, path)
                .map(|found| values_equal(found, value))
                .unwrap_or(false),
            Predicate::And(inner) => inner.iter().all(|p| p.matches(document)),
        }
    }

    fn render(&self, alias: &str, parameters: &mut Vec<QueryParameter>) -> String {
        match self {
            Predicate::Eq { path, value } => {
                let name = format!("@p{}", parameters.len());
                parameters.push(QueryParameter {
                    name: name.clone(),
                    value: value.clone(),
                });
                format!("{} = {}", render_path(alias, path), name)
            }
            Predicate::And(inner) => inner
                .iter()
                .map(|p| p.render(alias, parameters))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

/// Document handle passed to functional predicates.
#[derive(Debug, Clone, Copy)]
pub struct Doc;

impl Doc {
    pub fn field(&self, name: &str) -> FieldExpr {
        FieldExpr {
            path: vec![name.to_string()],
        }
    }
}

/// A field reference built inside a functional predicate.
#[derive(Debug, Clone)]
pub struct FieldExpr {
    path: Vec<String>,
}

impl FieldExpr {
    /// Descend into a nested object field.
    pub fn field(mut self, name: &str) -> FieldExpr {
        self.path.push(name.to_string());
        self
    }

    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        Predicate::Eq {
            path: self.path,
            value: value.into(),
        }
    }
}

/// A document query in any of the accepted styles.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Sql(QuerySpec),
    Filter(Predicate),
    All,
}

impl Query {
    pub fn sql(text: impl Into<String>) -> Self {
        Query::Sql(QuerySpec::new(text))
    }

    pub fn filter(predicate: Predicate) -> Self {
        Query::Filter(predicate)
    }

    pub fn matching<F>(build: F) -> Self
    where
        F: FnOnce(&Doc) -> Predicate,
    {
        Query::Filter(build(&Doc))
    }

    pub fn to_spec(&self) -> QuerySpec {
        match self {
            Query::Sql(spec) => spec.clone(),
            Query::All => QuerySpec::new(format!("SELECT * FROM root {}", ROOT_ALIAS)),
            Query::Filter(predicate) => {
                let mut parameters = Vec::new();
                let condition = predicate.render(ROOT_ALIAS, &mut parameters);
                QuerySpec {
                    query: format!("SELECT * FROM root {} WHERE {}", ROOT_ALIAS, condition),
                    parameters,
                }
            }
        }
    }
}

fn render_path(alias: &str, path: &[String]) -> String {
    let mut out = alias.to_string();
    for segment in path {
        if sql::is_identifier(segment) {
            out.push('.');
            out.push_str(segment);
        } else {
            out.push_str(&format!("[{}]", Value::String(segment.clone())));
        }
    }
    out
}

pub(crate) fn lookup<'a>(document: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(document, |current, segment| current.get(segment.as_str()))
}

/// JSON equality where numbers compare by value (`5 == 5.0`). Integers are
/// compared exactly; `f64` is only used when either side is a float.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else if x.is_f64() || y.is_f64() {
                x.as_f64() == y.as_f64()
            } else {
                // one side negative, the other above i64::MAX
                false
            }
        }
        _ => a == b,
    }
}
