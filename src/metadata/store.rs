//! Abstract document store trait.
//!
//! Any metadata backend must implement [`DocumentStore`].  Records are
//! schemaless JSON objects grouped into named collections; the store
//! assigns each record its id on insert.  The trait uses manually
//! desugared async methods (pinned futures) so it can be backed by both
//! local and remote stores.

use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

/// A record body: a JSON object.
pub type Document = Map<String, Value>;

/// A record together with its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Store-assigned identifier.
    pub id: String,
    /// Record body.
    pub fields: Document,
}

// ── Query types ────────────────────────────────────────────────────

/// A predicate on a single top-level field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`.
    Eq { field: String, value: Value },
    /// Half-open range `start <= field < end`.
    Range {
        field: String,
        start: Value,
        end: Value,
    },
}

impl Filter {
    /// Equality predicate.
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    /// Half-open range predicate.
    pub fn range(field: &str, start: impl Into<Value>, end: impl Into<Value>) -> Self {
        Filter::Range {
            field: field.to_string(),
            start: start.into(),
            end: end.into(),
        }
    }

    /// The field this predicate reads.
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq { field, .. } | Filter::Range { field, .. } => field,
        }
    }

    /// Evaluate the predicate against a record body.
    ///
    /// Missing fields and values of a different JSON type never match.
    pub fn matches(&self, document: &Document) -> bool {
        let Some(actual) = document.get(self.field()) else {
            return false;
        };
        match self {
            Filter::Eq { value, .. } => compare_values(actual, value) == Some(Ordering::Equal),
            Filter::Range { start, end, .. } => {
                matches!(
                    compare_values(actual, start),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && compare_values(actual, end) == Some(Ordering::Less)
            }
        }
    }
}

/// Sort direction for [`OrderBy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Single-field ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filters plus an optional ordering.  Without ordering, results come back
/// in the store's native order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// A query matching every record of a collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a predicate; all predicates must hold.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Order results by `field`.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// Whether a record body satisfies every predicate.
    pub fn matches(&self, document: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(document))
    }

    /// Sort `documents` in place by the query's ordering, if any.
    ///
    /// Records missing the field sort first in ascending order.
    pub fn sort(&self, documents: &mut [StoredDocument]) {
        let Some(order) = &self.order_by else {
            return;
        };
        documents.sort_by(|a, b| {
            let ord = match (a.fields.get(&order.field), b.fields.get(&order.field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }
}

/// Compare two scalar JSON values of the same type.
///
/// Strings compare by code point (byte order of their UTF-8 encoding),
/// numbers numerically, booleans `false < true`.  Any other combination is
/// incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Generate a 20-character alphanumeric record id.
pub fn generate_document_id() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async document store contract.
pub trait DocumentStore: Send + Sync + 'static {
    /// Insert a new record, returning its store-assigned id.
    fn insert(
        &self,
        collection: &str,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;

    /// Get a single record by id.
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredDocument>>> + Send + '_>>;

    /// Return every record of `collection` matching `query`.
    fn query(
        &self,
        collection: &str,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<StoredDocument>>> + Send + '_>>;

    /// Delete a record. Returns `false` if it did not exist.
    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;
}
