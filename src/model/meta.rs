//! Static field metadata for each category.
//!
//! Every rule the validator and the reference tracker enforce is driven from
//! these tables: presence, format, mutability, server-managed stamps, defaults
//! and foreign keys. Adding a referencing field is a metadata entry here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::model::Category;

pub const ID_FIELD: &str = "id";
pub const CREATION_TIME_FIELD: &str = "creationTime";
pub const UPDATE_TIME_FIELD: &str = "updateTime";

/// Find control field: offset of the first returned record
pub const INDEX_FIELD: &str = "_index";
/// Find control field: maximum number of returned records
pub const COUNT_FIELD: &str = "_count";
pub const DEFAULT_COUNT: usize = 5;

pub const ROLES: [&str; 3] = ["admin", "author", "commenter"];

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid id regex"));
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\-' ]+$").expect("valid name regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@]+@[^\.]+(\.[^\.]+)+$").expect("valid email regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d\d?-\d\d?$").expect("valid date regex"));
static KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w\-]+$").expect("valid keyword regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Id,
    Text,
    Name,
    Email,
    Date,
    Time,
    Roles,
    Keywords,
}

impl FieldKind {
    pub fn is_list(&self) -> bool {
        matches!(self, FieldKind::Roles | FieldKind::Keywords)
    }

    /// Human-readable format requirement, used in `BAD_FIELD_VALUE` messages
    pub fn requirement(&self) -> &'static str {
        match self {
            FieldKind::Id => "can only contain alphanumerics or _",
            FieldKind::Text => "must be a non-empty string",
            FieldKind::Name => "can only contain alphabetics, -, ' or space",
            FieldKind::Email => "must be of the form \"user@domain.tld\"",
            FieldKind::Date => "must be of the form \"YYYY-MM-DD\"",
            FieldKind::Time => "must be an RFC 3339 timestamp",
            FieldKind::Roles => "must be a list of roles from admin, author, commenter",
            FieldKind::Keywords => "must be a list of words (alphanumerics, _ or -)",
        }
    }

    fn accepts_element(&self, s: &str) -> bool {
        match self {
            FieldKind::Id => ID_RE.is_match(s),
            FieldKind::Text => !s.trim().is_empty(),
            FieldKind::Name => NAME_RE.is_match(s),
            FieldKind::Email => EMAIL_RE.is_match(s),
            FieldKind::Date => DATE_RE.is_match(s),
            FieldKind::Time => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            FieldKind::Roles => ROLES.contains(&s),
            FieldKind::Keywords => KEYWORD_RE.is_match(s),
        }
    }

    /// Format check for a stored value. List kinds need an array of valid elements.
    pub fn accepts(&self, value: &Value) -> bool {
        match value {
            Value::String(s) if !self.is_list() => self.accepts_element(s),
            Value::Array(items) if self.is_list() => items
                .iter()
                .all(|item| item.as_str().is_some_and(|s| self.accepts_element(s))),
            _ => false,
        }
    }

    /// Format check for a find predicate: list kinds also take a single element.
    pub fn accepts_predicate(&self, value: &Value) -> bool {
        match value {
            Value::String(s) if self.is_list() => self.accepts_element(s),
            other => self.accepts(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: &'static str,
    pub friendly_name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub immutable: bool,
    pub server_managed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    fn new(name: &'static str, friendly_name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            friendly_name,
            kind,
            required: false,
            immutable: false,
            server_managed: false,
            references: None,
            default: None,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    fn server_managed(mut self) -> Self {
        self.server_managed = true;
        self
    }

    /// Foreign keys are immutable so updates never need to touch the reference index
    fn references(mut self, target: Category) -> Self {
        self.references = Some(target);
        self.immutable = true;
        self
    }

    fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Caller may set this field on update
    pub fn is_mutable(&self) -> bool {
        !self.immutable && !self.server_managed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryMeta {
    pub category: Category,
    pub fields: Vec<FieldSpec>,
}

impl CategoryMeta {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Fields naming a record of another category, with their target
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&FieldSpec, Category)> {
        self.fields
            .iter()
            .filter_map(|f| f.references.map(|target| (f, target)))
    }
}

fn time_fields() -> [FieldSpec; 2] {
    [
        FieldSpec::new(CREATION_TIME_FIELD, "Creation Time", FieldKind::Time).server_managed(),
        FieldSpec::new(UPDATE_TIME_FIELD, "Update Time", FieldKind::Time).server_managed(),
    ]
}

pub static USERS_META: Lazy<CategoryMeta> = Lazy::new(|| {
    let mut fields = vec![
        FieldSpec::new(ID_FIELD, "User Id", FieldKind::Id)
            .required()
            .immutable(),
        FieldSpec::new("email", "Email Address", FieldKind::Email).required(),
        FieldSpec::new("firstName", "First Name", FieldKind::Name).required(),
        FieldSpec::new("lastName", "Last Name", FieldKind::Name).required(),
        FieldSpec::new("birthDate", "Date of Birth", FieldKind::Date),
        FieldSpec::new("roles", "Roles", FieldKind::Roles).default_value(json!([])),
    ];
    fields.extend(time_fields());
    CategoryMeta {
        category: Category::Users,
        fields,
    }
});

pub static ARTICLES_META: Lazy<CategoryMeta> = Lazy::new(|| {
    let mut fields = vec![
        FieldSpec::new(ID_FIELD, "Article Id", FieldKind::Id).immutable(),
        FieldSpec::new("title", "Title", FieldKind::Text).required(),
        FieldSpec::new("content", "Content", FieldKind::Text).required(),
        FieldSpec::new("authorId", "Author Id", FieldKind::Id)
            .required()
            .references(Category::Users),
        FieldSpec::new("keywords", "Keywords", FieldKind::Keywords).default_value(json!([])),
    ];
    fields.extend(time_fields());
    CategoryMeta {
        category: Category::Articles,
        fields,
    }
});

pub static COMMENTS_META: Lazy<CategoryMeta> = Lazy::new(|| {
    let mut fields = vec![
        FieldSpec::new(ID_FIELD, "Comment Id", FieldKind::Id).immutable(),
        FieldSpec::new("articleId", "Article Id", FieldKind::Id)
            .required()
            .references(Category::Articles),
        FieldSpec::new("commenterId", "Commenter Id", FieldKind::Id)
            .required()
            .references(Category::Users),
        FieldSpec::new("content", "Content", FieldKind::Text).required(),
    ];
    fields.extend(time_fields());
    CategoryMeta {
        category: Category::Comments,
        fields,
    }
});

/// Metadata of every category keyed by category name, as served at `/meta`
pub fn all_meta() -> Value {
    let map = Category::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), json!(c.meta())))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_check_formats() {
        assert!(FieldKind::Id.accepts(&json!("bob_1")));
        assert!(!FieldKind::Id.accepts(&json!("bob smith")));
        assert!(!FieldKind::Id.accepts(&json!(42)));
        assert!(FieldKind::Email.accepts(&json!("bob@example.com")));
        assert!(!FieldKind::Email.accepts(&json!("bob@example")));
        assert!(FieldKind::Name.accepts(&json!("Mary-Jane O'Neil")));
        assert!(!FieldKind::Name.accepts(&json!("R2D2")));
        assert!(FieldKind::Date.accepts(&json!("1999-1-31")));
        assert!(!FieldKind::Date.accepts(&json!("31/01/1999")));
        assert!(FieldKind::Time.accepts(&json!("2024-01-01T00:00:00Z")));
        assert!(!FieldKind::Text.accepts(&json!("   ")));
    }

    #[test]
    fn list_kinds_need_arrays_except_in_predicates() {
        assert!(FieldKind::Roles.accepts(&json!(["admin", "author"])));
        assert!(FieldKind::Roles.accepts(&json!([])));
        assert!(!FieldKind::Roles.accepts(&json!(["owner"])));
        assert!(!FieldKind::Roles.accepts(&json!("admin")));
        assert!(FieldKind::Roles.accepts_predicate(&json!("admin")));
        assert!(!FieldKind::Roles.accepts_predicate(&json!("owner")));
        assert!(FieldKind::Keywords.accepts(&json!(["rust", "how-to"])));
        assert!(!FieldKind::Keywords.accepts(&json!(["two words"])));
    }

    #[test]
    fn foreign_keys_are_declared_per_category() {
        let users: Vec<_> = USERS_META.foreign_keys().collect();
        assert!(users.is_empty());

        let articles: Vec<_> = ARTICLES_META
            .foreign_keys()
            .map(|(f, t)| (f.name, t))
            .collect();
        assert_eq!(articles, vec![("authorId", Category::Users)]);

        let comments: Vec<_> = COMMENTS_META
            .foreign_keys()
            .map(|(f, t)| (f.name, t))
            .collect();
        assert_eq!(
            comments,
            vec![
                ("articleId", Category::Articles),
                ("commenterId", Category::Users)
            ]
        );
    }

    #[test]
    fn foreign_keys_and_ids_are_immutable() {
        for category in Category::ALL {
            let meta = category.meta();
            assert!(!meta.field(ID_FIELD).unwrap().is_mutable());
            for (field, _) in meta.foreign_keys() {
                assert!(!field.is_mutable(), "{} should be immutable", field.name);
            }
            assert!(!meta.field(CREATION_TIME_FIELD).unwrap().is_mutable());
        }
    }

    #[test]
    fn meta_document_lists_every_category() {
        let meta = all_meta();
        for category in Category::ALL {
            let fields = meta[category.as_str()]["fields"].as_array().unwrap();
            assert!(fields.iter().any(|f| f["name"] == "id"));
        }
        assert_eq!(meta["articles"]["fields"][3]["references"], "users");
    }
}
