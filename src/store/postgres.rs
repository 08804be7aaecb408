use anyhow::Context;
use log::debug;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, Row, Transaction};

use crate::logic::{
    foreign_key_refs, missing_target, removal_blocked, unknown_id, BackReference, ForeignKeyRef,
    Validator,
};
use crate::model::{
    generate_id, matches, now_timestamp, BlogError, BlogErrors, BlogResult, Category, ErrorCode, Id,
    Operation, Record, CREATION_TIME_FIELD, ID_FIELD, UPDATE_TIME_FIELD,
};
use crate::store::memory::MAX_ID_ATTEMPTS;
use crate::store::traits::BlogStore;

/// Records are JSONB documents keyed by (category, id); `seq` gives the find order.
/// `blog_references` mirrors the in-memory back-reference index.
const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS blog_records (
        category TEXT NOT NULL,
        id TEXT NOT NULL,
        seq BIGSERIAL NOT NULL,
        data JSONB NOT NULL,
        PRIMARY KEY (category, id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS blog_records_seq_idx ON blog_records (category, seq DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS blog_references (
        to_category TEXT NOT NULL,
        to_id TEXT NOT NULL,
        from_category TEXT NOT NULL,
        from_id TEXT NOT NULL,
        via_field TEXT NOT NULL,
        PRIMARY KEY (to_category, to_id, from_category, from_id, via_field)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS blog_references_from_idx ON blog_references (from_category, from_id)",
];

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create tables and indexes when missing
    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to run database migrations")?;
        }
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether the record exists, taking a row lock for the rest of the transaction
    async fn lock_record(
        tx: &mut Transaction<'_, Postgres>,
        category: Category,
        id: &str,
        exclusive: bool,
    ) -> BlogResult<bool> {
        let sql = if exclusive {
            "SELECT 1 FROM blog_records WHERE category = $1 AND id = $2 FOR UPDATE"
        } else {
            "SELECT 1 FROM blog_records WHERE category = $1 AND id = $2 FOR SHARE"
        };
        let row = sqlx::query(sql)
            .bind(category.as_str())
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.is_some())
    }

    /// Insert unless the id is taken; returns whether a row was written
    async fn insert_record(
        tx: &mut Transaction<'_, Postgres>,
        category: Category,
        id: &str,
        record: &Record,
    ) -> BlogResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO blog_records (category, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (category, id) DO NOTHING
            "#,
        )
        .bind(category.as_str())
        .bind(id)
        .bind(Json(record))
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn register_references(
        tx: &mut Transaction<'_, Postgres>,
        category: Category,
        id: &str,
        targets: &[ForeignKeyRef],
    ) -> BlogResult<()> {
        for fk in targets {
            sqlx::query(
                r#"
                INSERT INTO blog_references (to_category, to_id, from_category, from_id, via_field)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(fk.target.as_str())
            .bind(&fk.target_id)
            .bind(category.as_str())
            .bind(id)
            .bind(fk.via_field)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn references_to(
        tx: &mut Transaction<'_, Postgres>,
        category: Category,
        id: &str,
    ) -> BlogResult<Vec<BackReference>> {
        let rows = sqlx::query(
            r#"
            SELECT from_category, from_id, via_field
            FROM blog_references
            WHERE to_category = $1 AND to_id = $2
            ORDER BY from_category, via_field, from_id
            "#,
        )
        .bind(category.as_str())
        .bind(id)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter()
            .map(|row| -> BlogResult<BackReference> {
                let from: String = row.try_get("from_category")?;
                Ok(BackReference {
                    referencing_category: from.parse()?,
                    referencing_id: row.try_get("from_id")?,
                    via_field: row.try_get("via_field")?,
                })
            })
            .collect()
    }
}

/// JSONB containment document that pre-filters rows for a find predicate.
/// Scalars on list fields become one-element arrays; exact matching happens afterwards.
fn containment(category: Category, predicate: &Record) -> Record {
    let meta = category.meta();
    predicate
        .iter()
        .map(|(name, value)| {
            let is_list = meta.field(name).is_some_and(|f| f.kind.is_list());
            let value = match value {
                Value::String(_) if is_list => Value::Array(vec![value.clone()]),
                other => other.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

/// Containment equals the equality match unless a predicate carries a whole list,
/// since `@>` also accepts stored lists that are supersets of it.
fn containment_is_exact(predicate: &Record) -> bool {
    !predicate.values().any(Value::is_array)
}

#[async_trait::async_trait]
impl BlogStore for PostgresStore {
    async fn create(&self, category: Category, spec: &Record) -> BlogResult<Id> {
        let sanitized = Validator::validate(category, Operation::Create, spec)?;
        let supplied = sanitized.id().map(str::to_string);
        let mut fields = sanitized.fields;
        let mut tx = self.pool.begin().await?;

        let mut errors: Vec<BlogError> = Vec::new();
        let targets = foreign_key_refs(category, &fields);
        for fk in &targets {
            if !Self::lock_record(&mut tx, fk.target, &fk.target_id, false).await? {
                errors.push(missing_target(category, fk));
            }
        }
        let exists = |id: &str| {
            BlogError::new(
                ErrorCode::Exists,
                format!("{} object with id '{}' already exists", category, id),
            )
        };
        if let Some(id) = &supplied {
            if Self::lock_record(&mut tx, category, id, false).await? {
                errors.insert(0, exists(id));
            }
        }
        if !errors.is_empty() {
            tx.rollback().await?;
            return Err(BlogErrors(errors));
        }

        let now = now_timestamp();
        fields.insert(CREATION_TIME_FIELD.to_string(), Value::String(now.clone()));
        fields.insert(UPDATE_TIME_FIELD.to_string(), Value::String(now));

        let id = match supplied {
            Some(id) => {
                if !Self::insert_record(&mut tx, category, &id, &fields).await? {
                    tx.rollback().await?;
                    return Err(exists(&id).into());
                }
                id
            }
            None => {
                let mut inserted = None;
                for _ in 0..MAX_ID_ATTEMPTS {
                    let candidate = generate_id();
                    fields.insert(ID_FIELD.to_string(), Value::String(candidate.clone()));
                    if Self::insert_record(&mut tx, category, &candidate, &fields).await? {
                        inserted = Some(candidate);
                        break;
                    }
                }
                match inserted {
                    Some(id) => id,
                    None => {
                        tx.rollback().await?;
                        return Err(BlogErrors::single(
                            ErrorCode::Db,
                            "could not generate an unused id",
                        ));
                    }
                }
            }
        };

        Self::register_references(&mut tx, category, &id, &targets).await?;
        tx.commit().await?;

        debug!("created {} '{}'", category, id);
        Ok(id)
    }

    async fn find(&self, category: Category, spec: &Record) -> BlogResult<Vec<Record>> {
        let sanitized = Validator::validate(category, Operation::Find, spec)?;
        let page = sanitized.page();
        let document = Json(containment(category, &sanitized.fields));

        if containment_is_exact(&sanitized.fields) {
            let rows = sqlx::query(
                r#"
                SELECT data FROM blog_records
                WHERE category = $1 AND data @> $2
                ORDER BY seq DESC
                OFFSET $3 LIMIT $4
                "#,
            )
            .bind(category.as_str())
            .bind(document)
            .bind(page.index as i64)
            .bind(page.count as i64)
            .fetch_all(&self.pool)
            .await?;

            return rows
                .into_iter()
                .map(|row| -> BlogResult<Record> {
                    let Json(record): Json<Record> = row.try_get("data")?;
                    Ok(record)
                })
                .collect();
        }

        let rows = sqlx::query(
            r#"
            SELECT data FROM blog_records
            WHERE category = $1 AND data @> $2
            ORDER BY seq DESC
            "#,
        )
        .bind(category.as_str())
        .bind(document)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(record): Json<Record> = row.try_get("data")?;
            if matches(&record, &sanitized.fields) {
                records.push(record);
            }
        }
        Ok(page.apply(records))
    }

    async fn update(&self, category: Category, spec: &Record) -> BlogResult<()> {
        let sanitized = Validator::validate(category, Operation::Update, spec)?;
        let id = sanitized.id().unwrap_or_default().to_string();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT data FROM blog_records WHERE category = $1 AND id = $2 FOR UPDATE",
        )
        .bind(category.as_str())
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(unknown_id(category, &id));
        };

        let Json(mut record): Json<Record> = row.try_get("data")?;
        for (name, value) in sanitized.fields {
            if name != ID_FIELD {
                record.insert(name, value);
            }
        }
        record.insert(
            UPDATE_TIME_FIELD.to_string(),
            Value::String(now_timestamp()),
        );

        sqlx::query("UPDATE blog_records SET data = $3 WHERE category = $1 AND id = $2")
            .bind(category.as_str())
            .bind(&id)
            .bind(Json(&record))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("updated {} '{}'", category, id);
        Ok(())
    }

    async fn remove(&self, category: Category, spec: &Record) -> BlogResult<()> {
        let sanitized = Validator::validate(category, Operation::Remove, spec)?;
        let id = sanitized.id().unwrap_or_default();
        let mut tx = self.pool.begin().await?;

        if !Self::lock_record(&mut tx, category, id, true).await? {
            tx.rollback().await?;
            return Err(unknown_id(category, &id));
        }
        let references = Self::references_to(&mut tx, category, id).await?;
        if !references.is_empty() {
            tx.rollback().await?;
            return Err(removal_blocked(category, id, &references));
        }

        sqlx::query("DELETE FROM blog_records WHERE category = $1 AND id = $2")
            .bind(category.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM blog_references WHERE from_category = $1 AND from_id = $2")
            .bind(category.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("removed {} '{}'", category, id);
        Ok(())
    }

    async fn clear(&self) -> BlogResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM blog_references")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM blog_records")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_predicates_need_exact_filtering() {
        let scalar = json!({ "roles": "admin", "id": "ann" })
            .as_object()
            .cloned()
            .unwrap();
        assert!(containment_is_exact(&scalar));
        assert!(containment_is_exact(&Record::new()));

        let whole_list = json!({ "roles": ["admin"] }).as_object().cloned().unwrap();
        assert!(!containment_is_exact(&whole_list));
    }

    #[test]
    fn containment_wraps_list_scalars() {
        let predicate = json!({ "roles": "admin", "firstName": "Ann" })
            .as_object()
            .cloned()
            .unwrap();
        let doc = containment(Category::Users, &predicate);
        assert_eq!(
            Value::Object(doc),
            json!({ "roles": ["admin"], "firstName": "Ann" })
        );
    }
}
