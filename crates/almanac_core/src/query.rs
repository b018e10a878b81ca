//! Partial-match equality queries.

use almanac_codec::{Fields, Record, Value, ID_FIELD};

/// A partial mapping from field name to target value.
///
/// A record matches when every queried field is present on it with an equal
/// value. The `id` field can be queried like any other. An empty query
/// matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(Fields);

impl Query {
    /// Creates a query that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a query on the record id.
    pub fn by_id(id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self::all().eq(ID_FIELD, id)
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field, value);
        self
    }

    /// Returns the target value for a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns true if the query names `field`.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    /// Returns the queried field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.names()
    }

    /// Returns the number of conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the query has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `record` satisfies every condition.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.0
            .iter()
            .all(|(field, target)| record.value_of(field).is_some_and(|v| *v == *target))
    }

    /// Returns true if `record` satisfies the conditions on `fields`.
    ///
    /// Fields the query does not name are ignored.
    pub fn matches_on<S: AsRef<str>>(&self, record: &Record, fields: &[S]) -> bool {
        fields.iter().all(|field| {
            let field = field.as_ref();
            match self.0.get(field) {
                Some(target) => record.value_of(field).is_some_and(|v| *v == *target),
                None => true,
            }
        })
    }
}

impl From<Fields> for Query {
    fn from(fields: Fields) -> Self {
        Self(fields)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Record {
        Record::new(
            "e1",
            Fields::new()
                .with("calendar_id", "c1")
                .with("startDate", 100)
                .with("allDay", false)
                .with("note", Value::Null),
        )
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(Query::all().matches(&event()));
        assert!(Query::all().is_empty());
    }

    #[test]
    fn equality_on_every_field() {
        let query = Query::all().eq("calendar_id", "c1").eq("startDate", 100);
        assert!(query.matches(&event()));

        let query = Query::all().eq("calendar_id", "c1").eq("startDate", 101);
        assert!(!query.matches(&event()));
    }

    #[test]
    fn missing_field_does_not_match_null() {
        assert!(Query::all().eq("note", Value::Null).matches(&event()));
        assert!(!Query::all().eq("location", Value::Null).matches(&event()));
    }

    #[test]
    fn id_is_queryable() {
        assert!(Query::by_id("e1").matches(&event()));
        assert!(!Query::by_id("e2").matches(&event()));
    }

    #[test]
    fn residual_check_only_looks_at_given_fields() {
        let query = Query::all().eq("calendar_id", "other").eq("allDay", false);
        assert!(query.matches_on(&event(), &["allDay"]));
        assert!(!query.matches_on(&event(), &["calendar_id", "allDay"]));
        assert!(query.matches_on(&event(), &["unqueried"]));
    }
}
