use crate::model::{Category, Id, Record};
use crate::store::traits::BlogStore;
use anyhow::{Context, Result};
use serde_json::{json, Value};

/// Replace the store contents with a small demonstration blog.
///
/// Everything goes through `create`, so the usual validation and reference
/// checks apply to the seed set as well.
pub async fn load_seed_data<S: BlogStore + ?Sized>(store: &S) -> Result<()> {
    store.clear().await.context("Failed to clear store before seeding")?;

    load_users(store).await?;
    let article_ids = load_articles(store).await?;
    load_comments(store, &article_ids).await?;

    log::info!(
        "seeded {} users, {} articles",
        USERS.len(),
        article_ids.len()
    );
    Ok(())
}

const USERS: [(&str, &str, &str, &str, &str, &[&str]); 4] = [
    ("ada", "ada@example.com", "Ada", "Lovelace", "1815-12-10", &["admin", "author"]),
    ("grace", "grace@example.com", "Grace", "Hopper", "1906-12-09", &["author", "commenter"]),
    ("alan", "alan@example.com", "Alan", "Turing", "1912-06-23", &["commenter"]),
    ("barbara", "barbara@example.com", "Barbara", "Liskov", "1939-11-07", &["author"]),
];

fn object(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("seed entry is not an object: {}", other),
    }
}

async fn create<S: BlogStore + ?Sized>(store: &S, category: Category, value: Value) -> Result<Id> {
    let spec = object(value)?;
    store
        .create(category, &spec)
        .await
        .with_context(|| format!("Failed to seed {}", category))
}

async fn load_users<S: BlogStore + ?Sized>(store: &S) -> Result<()> {
    for (id, email, first, last, birth, roles) in USERS {
        create(
            store,
            Category::Users,
            json!({
                "id": id,
                "email": email,
                "firstName": first,
                "lastName": last,
                "birthDate": birth,
                "roles": roles,
            }),
        )
        .await?;
    }
    Ok(())
}

async fn load_articles<S: BlogStore + ?Sized>(store: &S) -> Result<Vec<Id>> {
    let articles = [
        (
            "ada",
            "Notes on the Analytical Engine",
            "The engine weaves algebraic patterns just as the loom weaves flowers and leaves.",
            json!(["engines", "algorithms"]),
        ),
        (
            "grace",
            "Compilers for everyone",
            "Programs should be written in a language close to English.",
            json!(["compilers", "languages"]),
        ),
        (
            "barbara",
            "Substitutability",
            "Subtypes must be usable wherever their supertypes are expected.",
            json!(["types", "design"]),
        ),
    ];

    let mut ids = Vec::with_capacity(articles.len());
    for (author, title, content, keywords) in articles {
        let id = create(
            store,
            Category::Articles,
            json!({
                "title": title,
                "content": content,
                "authorId": author,
                "keywords": keywords,
            }),
        )
        .await?;
        ids.push(id);
    }
    Ok(ids)
}

async fn load_comments<S: BlogStore + ?Sized>(store: &S, article_ids: &[Id]) -> Result<()> {
    let comments = [
        (0, "alan", "Could such an engine ever think?"),
        (0, "grace", "It already computes Bernoulli numbers."),
        (1, "alan", "A universal machine would need no special language."),
        (2, "ada", "A fine principle for engines too."),
    ];

    for (article, commenter, content) in comments {
        let Some(article_id) = article_ids.get(article) else {
            continue;
        };
        create(
            store,
            Category::Comments,
            json!({
                "articleId": article_id,
                "commenterId": commenter,
                "content": content,
            }),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn seed_set_passes_validation() {
        let store = MemoryStore::new();
        load_seed_data(&store).await.unwrap();

        let mut all = Record::new();
        all.insert("_count".to_string(), json!(100));
        let users = store.find(Category::Users, &all).await.unwrap();
        let comments = store.find(Category::Comments, &all).await.unwrap();
        assert_eq!(users.len(), 4);
        assert_eq!(comments.len(), 4);
    }

    #[tokio::test]
    async fn seeding_twice_replaces_data() {
        let store = MemoryStore::new();
        load_seed_data(&store).await.unwrap();
        load_seed_data(&store).await.unwrap();

        let mut all = Record::new();
        all.insert("_count".to_string(), json!(100));
        let articles = store.find(Category::Articles, &all).await.unwrap();
        assert_eq!(articles.len(), 3);
    }
}
