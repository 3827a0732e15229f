//! Query filters and sort orders.
//!
//! A [`Filter`] is a conjunction of conditions on dotted field paths. Arrays
//! met along a path, or at its end, are unwrapped: `Filter::new().eq("tags",
//! "rust")` matches a document whose `tags` array contains `"rust"`.
//!
//! The same semantics are implemented twice: in memory by [`Filter::matches`]
//! and in SQL by the PostgreSQL store.

use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Exists,
}

/// A single `path <op> value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub path: String,
    pub op: Op,
    pub value: Value,
}

/// Conjunction of conditions. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, path: impl Into<String>, op: Op, value: Value) -> Self {
        self.conditions.push(Condition {
            path: path.into(),
            op,
            value,
        });
        self
    }

    pub fn eq(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Op::Eq, value.into())
    }

    /// Matches documents whose field differs from `value`, including
    /// documents that lack the field.
    pub fn ne(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Op::Ne, value.into())
    }

    pub fn gt(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Op::Gt, value.into())
    }

    pub fn gte(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Op::Gte, value.into())
    }

    pub fn lt(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Op::Lt, value.into())
    }

    pub fn lte(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Op::Lte, value.into())
    }

    /// Matches when the field equals any of `values`. An empty set matches
    /// nothing.
    pub fn any_of<V: Into<Value>>(
        self,
        path: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push(path, Op::In, Value::Array(values))
    }

    pub fn exists(self, path: impl Into<String>, exists: bool) -> Self {
        self.push(path, Op::Exists, Value::Bool(exists))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluates the filter against a raw document.
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

impl Condition {
    fn matches(&self, doc: &Map<String, Value>) -> bool {
        let candidates = candidates(doc, &self.path);

        match self.op {
            Op::Eq => candidates.iter().any(|c| values_equal(c, &self.value)),
            Op::Ne => !candidates.iter().any(|c| values_equal(c, &self.value)),
            Op::In => {
                let Value::Array(options) = &self.value else {
                    return false;
                };
                candidates
                    .iter()
                    .any(|c| options.iter().any(|o| values_equal(c, o)))
            }
            Op::Exists => !candidates.is_empty() == self.value.as_bool().unwrap_or(true),
            Op::Gt => self.any_ordered(&candidates, |o| o == Ordering::Greater),
            Op::Gte => self.any_ordered(&candidates, |o| o != Ordering::Less),
            Op::Lt => self.any_ordered(&candidates, |o| o == Ordering::Less),
            Op::Lte => self.any_ordered(&candidates, |o| o != Ordering::Greater),
        }
    }

    fn any_ordered(&self, candidates: &[&Value], accept: impl Fn(Ordering) -> bool) -> bool {
        candidates
            .iter()
            .filter_map(|c| compare_scalars(c, &self.value))
            .any(accept)
    }
}

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ascending,
    Descending,
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub path: String,
    pub direction: Direction,
}

/// Splits a dotted path into its segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Returns every value reachable at `path`, unwrapping arrays.
///
/// An array found at the end of the path contributes itself and each of its
/// elements.
pub(crate) fn candidates<'a>(doc: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let segments = segments(path);
    let mut found = Vec::new();

    if let Some((head, rest)) = segments.split_first()
        && let Some(child) = doc.get(*head)
    {
        resolve(child, rest, &mut found);
    }

    let mut out = Vec::with_capacity(found.len());
    for value in found {
        out.push(value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn resolve<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                resolve(child, rest, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve(item, segments, out);
            }
        }
        _ => {}
    }
}

/// First value at `path`, used as a sort key.
pub(crate) fn sort_value<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let segments = segments(path);
    let (head, rest) = segments.split_first()?;
    let mut found = Vec::new();
    resolve(doc.get(*head)?, rest, &mut found);
    found.into_iter().next()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Orders two numbers or two strings; anything else is incomparable.
fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values used for sorting.
///
/// Values of different types order by type: null, numbers, strings,
/// objects, arrays, booleans. Strings compare by code point, shorter arrays
/// sort first and objects only compare by size. The PostgreSQL store sorts
/// the same way for every case but objects of equal size.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y.iter())
                .map(|(l, r)| compare_values(l, r))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => compare_scalars(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
    }
}

/// Compares two documents by a list of sort keys.
///
/// Missing values sort last ascending and first descending.
pub(crate) fn compare_documents(
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    keys: &[SortKey],
) -> Ordering {
    for key in keys {
        let ordering = match (sort_value(a, &key.path), sort_value(b, &key.path)) {
            (Some(x), Some(y)) => compare_values(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        let ordering = match key.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };

        if ordering.is_ne() {
            return ordering;
        }
    }
    Ordering::Equal
}
