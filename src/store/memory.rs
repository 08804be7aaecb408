use log::debug;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use crate::logic::{removal_blocked, unknown_id, EntityIndex, ReferenceTracker, Validator};
use crate::model::{
    generate_id, matches, now_timestamp, BlogError, BlogErrors, BlogResult, Category, ErrorCode, Id,
    Operation, Record, CREATION_TIME_FIELD, ID_FIELD, UPDATE_TIME_FIELD,
};
use crate::store::traits::BlogStore;

/// Attempts at drawing an unused id before giving up
pub(crate) const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
struct StoredRecord {
    /// Insertion sequence; find orders by it, newest first
    seq: u64,
    record: Record,
}

#[derive(Debug, Default)]
struct CategoryTable {
    rows: HashMap<Id, StoredRecord>,
}

impl CategoryTable {
    fn fresh_id(&self) -> BlogResult<Id> {
        (0..MAX_ID_ATTEMPTS)
            .map(|_| generate_id())
            .find(|id| !self.rows.contains_key(id))
            .ok_or_else(|| BlogErrors::single(ErrorCode::Db, "could not generate an unused id"))
    }
}

#[derive(Debug, Default)]
struct BlogData {
    users: CategoryTable,
    articles: CategoryTable,
    comments: CategoryTable,
    references: ReferenceTracker,
    next_seq: u64,
}

impl BlogData {
    fn table(&self, category: Category) -> &CategoryTable {
        match category {
            Category::Users => &self.users,
            Category::Articles => &self.articles,
            Category::Comments => &self.comments,
        }
    }

    fn table_mut(&mut self, category: Category) -> &mut CategoryTable {
        match category {
            Category::Users => &mut self.users,
            Category::Articles => &mut self.articles,
            Category::Comments => &mut self.comments,
        }
    }
}

impl EntityIndex for BlogData {
    fn contains(&self, category: Category, id: &str) -> bool {
        self.table(category).rows.contains_key(id)
    }
}

/// Store keeping every category in memory behind one lock.
///
/// Each mutation holds the write lock for its whole duration, so validation
/// of references, insertion and registration appear atomic to readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BlogData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlogStore for MemoryStore {
    async fn create(&self, category: Category, spec: &Record) -> BlogResult<Id> {
        let sanitized = Validator::validate(category, Operation::Create, spec)?;
        let mut fields = sanitized.fields;
        let mut data = self.data.write();

        let mut errors = Vec::new();
        if let Some(id) = fields.get(ID_FIELD).and_then(Value::as_str) {
            if data.contains(category, id) {
                errors.push(BlogError::new(
                    ErrorCode::Exists,
                    format!("{} object with id '{}' already exists", category, id),
                ));
            }
        }
        let targets = match ReferenceTracker::resolve_targets(&*data, category, &fields) {
            Ok(targets) => targets,
            Err(missing) => {
                errors.extend(missing);
                Vec::new()
            }
        };
        BlogErrors::check(errors)?;

        let id = match fields.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => data.table(category).fresh_id()?,
        };
        let now = now_timestamp();
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        fields.insert(CREATION_TIME_FIELD.to_string(), Value::String(now.clone()));
        fields.insert(UPDATE_TIME_FIELD.to_string(), Value::String(now));

        let seq = data.next_seq;
        data.next_seq += 1;
        data.table_mut(category).rows.insert(
            id.clone(),
            StoredRecord {
                seq,
                record: fields,
            },
        );
        data.references.register_all(category, &id, &targets);

        debug!("created {} '{}'", category, id);
        Ok(id)
    }

    async fn find(&self, category: Category, spec: &Record) -> BlogResult<Vec<Record>> {
        let sanitized = Validator::validate(category, Operation::Find, spec)?;
        let data = self.data.read();

        let mut found: Vec<&StoredRecord> = data
            .table(category)
            .rows
            .values()
            .filter(|row| matches(&row.record, &sanitized.fields))
            .collect();
        found.sort_by(|a, b| b.seq.cmp(&a.seq));

        Ok(sanitized
            .page()
            .apply(found.into_iter().map(|row| row.record.clone())))
    }

    async fn update(&self, category: Category, spec: &Record) -> BlogResult<()> {
        let sanitized = Validator::validate(category, Operation::Update, spec)?;
        let id = sanitized.id().unwrap_or_default().to_string();
        let mut data = self.data.write();

        let row = data
            .table_mut(category)
            .rows
            .get_mut(&id)
            .ok_or_else(|| unknown_id(category, &id))?;
        for (name, value) in sanitized.fields {
            if name != ID_FIELD {
                row.record.insert(name, value);
            }
        }
        row.record.insert(
            UPDATE_TIME_FIELD.to_string(),
            Value::String(now_timestamp()),
        );

        debug!("updated {} '{}'", category, id);
        Ok(())
    }

    async fn remove(&self, category: Category, spec: &Record) -> BlogResult<()> {
        let sanitized = Validator::validate(category, Operation::Remove, spec)?;
        let id = sanitized.id().unwrap_or_default();
        let mut data = self.data.write();

        if !data.contains(category, id) {
            return Err(unknown_id(category, id));
        }
        let references = data.references.references_to(category, id);
        if !references.is_empty() {
            return Err(removal_blocked(category, id, &references));
        }

        data.table_mut(category).rows.remove(id);
        data.references.remove_references_from(category, id);

        debug!("removed {} '{}'", category, id);
        Ok(())
    }

    async fn clear(&self) -> BlogResult<()> {
        *self.data.write() = BlogData::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_then_find_by_id() {
        let store = MemoryStore::new();
        let id = store
            .create(
                Category::Users,
                &spec(json!({
                    "id": "ann",
                    "email": "ann@example.com",
                    "firstName": "Ann",
                    "lastName": "Lee"
                })),
            )
            .await
            .unwrap();
        assert_eq!(id, "ann");

        let found = store
            .find(Category::Users, &spec(json!({ "id": "ann" })))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["roles"], json!([]));
        assert_eq!(found[0][CREATION_TIME_FIELD], found[0][UPDATE_TIME_FIELD]);
    }

    #[tokio::test]
    async fn dangling_reference_commits_nothing() {
        let store = MemoryStore::new();
        let article = spec(json!({
            "id": "a1",
            "title": "T",
            "content": "C",
            "authorId": "ghost"
        }));
        let err = store.create(Category::Articles, &article).await.unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::BadId]);

        let data = store.data.read();
        assert!(data.articles.rows.is_empty());
        assert!(data.references.is_empty());
    }

    #[test]
    fn fresh_ids_avoid_existing_rows() {
        let mut table = CategoryTable::default();
        for _ in 0..20 {
            let id = table.fresh_id().unwrap();
            assert!(!table.rows.contains_key(&id));
            table.rows.insert(
                id,
                StoredRecord {
                    seq: 0,
                    record: Record::new(),
                },
            );
        }
        assert_eq!(table.rows.len(), 20);
    }
}
