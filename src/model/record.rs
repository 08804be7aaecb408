use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::model::{Category, DEFAULT_COUNT, ID_FIELD};

/// A stored entity or an operation spec: field name to JSON value
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Find,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Find => "find",
            Operation::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Window over the ordered find results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub count: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            index: 0,
            count: DEFAULT_COUNT,
        }
    }
}

impl Page {
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items.into_iter().skip(self.index).take(self.count).collect()
    }
}

/// Validated form of an operation spec
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub category: Category,
    pub operation: Operation,
    /// Declared fields only; control fields are split out into `page`
    pub fields: Record,
    /// Present for find
    pub page: Option<Page>,
}

impl Sanitized {
    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn page(&self) -> Page {
        self.page.unwrap_or_default()
    }
}

/// Equality match of a stored record against a find predicate.
///
/// A scalar predicate on a list-valued field matches when the list contains it.
pub fn matches(record: &Record, predicate: &Record) -> bool {
    predicate.iter().all(|(key, wanted)| match record.get(key) {
        Some(Value::Array(items)) if !wanted.is_array() => items.contains(wanted),
        Some(stored) => stored == wanted,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn predicate_matches_scalars_and_list_members() {
        let user = record(json!({
            "id": "bob",
            "firstName": "Bob",
            "roles": ["author", "commenter"]
        }));

        assert!(matches(&user, &Record::new()));
        assert!(matches(&user, &record(json!({ "id": "bob" }))));
        assert!(matches(&user, &record(json!({ "roles": "author" }))));
        assert!(matches(
            &user,
            &record(json!({ "roles": ["author", "commenter"] }))
        ));
        assert!(!matches(&user, &record(json!({ "roles": ["author"] }))));
        assert!(!matches(&user, &record(json!({ "roles": "admin" }))));
        assert!(!matches(&user, &record(json!({ "birthDate": "2000-1-1" }))));
    }

    #[test]
    fn page_skips_then_takes() {
        let page = Page { index: 2, count: 2 };
        assert_eq!(page.apply(0..10), vec![2, 3]);
        assert_eq!(Page { index: 9, count: 5 }.apply(0..10), vec![9]);
        assert_eq!(Page::default().apply(0..10).len(), DEFAULT_COUNT);
    }
}
