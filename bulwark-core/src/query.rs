//! Store queries.
//!
//! A [`Query`] selects documents of one collection by conjunctive equality
//! and array-membership filters, the two predicates the isolation layer needs.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A single query predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// `field == value`
    Eq {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// `value IN field` where `field` is an array.
    ArrayContains {
        /// Field name.
        field: String,
        /// Element that must be present.
        value: Value,
    },
}

impl Filter {
    /// Returns true if the document satisfies this predicate.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::Eq { field, value } => document.get(field) == Some(value),
            Self::ArrayContains { field, value } => match document.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { field, value } => write!(f, "{field} == {value}"),
            Self::ArrayContains { field, value } => write!(f, "{field} array-contains {value}"),
        }
    }
}

/// A query over one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    collection: String,
    filters: Vec<Filter>,
    limit: Option<usize>,
}

impl Query {
    /// Creates an unfiltered query over a collection.
    #[must_use]
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            limit: None,
        }
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds an array-membership filter.
    #[must_use]
    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter::ArrayContains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Caps the number of returned documents.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the collection path.
    #[must_use]
    pub fn collection_path(&self) -> &str {
        &self.collection
    }

    /// Returns the filters.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns the result limit, if any.
    #[must_use]
    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    /// Returns true if the query has no filters.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns a copy of this query with every filter removed.
    #[must_use]
    pub fn without_filters(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            filters: Vec::new(),
            limit: self.limit,
        }
    }

    /// Returns true if the document belongs to the collection and satisfies
    /// every filter.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        document.path().collection() == self.collection
            && self.filters.iter().all(|f| f.matches(document))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection)?;
        for (i, filter) in self.filters.iter().enumerate() {
            let joiner = if i == 0 { " WHERE " } else { " AND " };
            write!(f, "{joiner}{filter}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentPath;
    use serde_json::json;

    fn doc(collection: &str, id: &str, value: Value) -> Document {
        let Value::Object(fields) = value else {
            panic!("expected object")
        };
        Document::new(DocumentPath::new(collection, id).unwrap(), fields)
    }

    #[test]
    fn test_eq_filter() {
        let query = Query::collection("projects").where_eq("founderId", "alice");
        assert!(query.matches(&doc("projects", "p1", json!({ "founderId": "alice" }))));
        assert!(!query.matches(&doc("projects", "p2", json!({ "founderId": "bob" }))));
        assert!(!query.matches(&doc("deals", "d1", json!({ "founderId": "alice" }))));
    }

    #[test]
    fn test_array_contains_filter() {
        let query = Query::collection("chat_rooms").where_array_contains("participants", "bob");
        assert!(query.matches(&doc(
            "chat_rooms",
            "r1",
            json!({ "participants": ["alice", "bob"] })
        )));
        assert!(!query.matches(&doc("chat_rooms", "r2", json!({ "participants": "bob" }))));
    }

    #[test]
    fn test_display() {
        let query = Query::collection("notifications")
            .where_eq("userId", "alice")
            .limit(50);
        assert_eq!(
            query.to_string(),
            "notifications WHERE userId == \"alice\" LIMIT 50"
        );
        assert!(query.without_filters().is_unfiltered());
    }
}
