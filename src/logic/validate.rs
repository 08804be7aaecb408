use serde_json::Value;

use crate::model::{
    BlogError, BlogErrors, BlogResult, Category, CategoryMeta, ErrorCode, FieldKind, FieldSpec,
    Operation, Page, Record, Sanitized, COUNT_FIELD, ID_FIELD, INDEX_FIELD,
};

/// Shape checks for operation specs.
///
/// Pure: looks only at the spec and the static category metadata. Whether ids
/// exist, or whether foreign keys resolve, is decided by the store.
pub struct Validator;

impl Validator {
    /// Validate with a category name as received from a caller
    pub fn validate_named(category: &str, operation: Operation, spec: &Record) -> BlogResult<Sanitized> {
        let category: Category = category.parse()?;
        Self::validate(category, operation, spec)
    }

    pub fn validate(category: Category, operation: Operation, spec: &Record) -> BlogResult<Sanitized> {
        let meta = category.meta();
        let mut errors = Vec::new();
        let mut fields = Record::new();
        let mut page = None;

        match operation {
            Operation::Create => Self::validate_create(meta, spec, &mut fields, &mut errors),
            Operation::Update => Self::validate_update(meta, spec, &mut fields, &mut errors),
            Operation::Find => {
                page = Some(Self::validate_find(meta, spec, &mut fields, &mut errors));
            }
            Operation::Remove => Self::validate_remove(meta, spec, &mut fields, &mut errors),
        }

        BlogErrors::check(errors)?;
        Ok(Sanitized {
            category,
            operation,
            fields,
            page,
        })
    }

    fn validate_create(
        meta: &CategoryMeta,
        spec: &Record,
        fields: &mut Record,
        errors: &mut Vec<BlogError>,
    ) {
        for (name, value) in spec {
            let Some(field) = Self::declared_field(meta, name, Operation::Create, errors) else {
                continue;
            };
            if field.server_managed {
                errors.push(Self::server_managed(meta, field));
                continue;
            }
            if let Some(value) = Self::checked_value(meta, field, value, false, errors) {
                fields.insert(name.clone(), value);
            }
        }

        for field in meta.required_fields() {
            if !spec.contains_key(field.name) {
                errors.push(BlogError::new(
                    ErrorCode::MissingField,
                    format!(
                        "missing value for required field '{}' ({}) of {}",
                        field.name, field.friendly_name, meta.category
                    ),
                ));
            }
        }

        for field in &meta.fields {
            if let Some(default) = &field.default {
                if !fields.contains_key(field.name) && !spec.contains_key(field.name) {
                    fields.insert(field.name.to_string(), default.clone());
                }
            }
        }
    }

    fn validate_update(
        meta: &CategoryMeta,
        spec: &Record,
        fields: &mut Record,
        errors: &mut Vec<BlogError>,
    ) {
        Self::require_id(meta, spec, Operation::Update, fields, errors);

        for (name, value) in spec {
            if name == ID_FIELD {
                continue;
            }
            let Some(field) = Self::declared_field(meta, name, Operation::Update, errors) else {
                continue;
            };
            if !field.is_mutable() {
                errors.push(BlogError::new(
                    ErrorCode::BadField,
                    format!(
                        "field '{}' of {} cannot be updated",
                        field.name, meta.category
                    ),
                ));
                continue;
            }
            if let Some(value) = Self::checked_value(meta, field, value, false, errors) {
                fields.insert(name.clone(), value);
            }
        }
    }

    fn validate_find(
        meta: &CategoryMeta,
        spec: &Record,
        fields: &mut Record,
        errors: &mut Vec<BlogError>,
    ) -> Page {
        let mut page = Page::default();

        for (name, value) in spec {
            if name == INDEX_FIELD || name == COUNT_FIELD {
                match Self::parse_count(value) {
                    Some(n) if name == INDEX_FIELD => page.index = n,
                    Some(n) => page.count = n,
                    None => errors.push(BlogError::new(
                        ErrorCode::BadFieldValue,
                        format!("'{}' must be a non-negative integer", name),
                    )),
                }
                continue;
            }
            let Some(field) = Self::declared_field(meta, name, Operation::Find, errors) else {
                continue;
            };
            if let Some(value) = Self::checked_value(meta, field, value, true, errors) {
                fields.insert(name.clone(), value);
            }
        }

        page
    }

    fn validate_remove(
        meta: &CategoryMeta,
        spec: &Record,
        fields: &mut Record,
        errors: &mut Vec<BlogError>,
    ) {
        Self::require_id(meta, spec, Operation::Remove, fields, errors);

        for name in spec.keys().filter(|k| k.as_str() != ID_FIELD) {
            errors.push(BlogError::new(
                ErrorCode::BadField,
                format!("field '{}' is not allowed when removing {}", name, meta.category),
            ));
        }
    }

    fn require_id(
        meta: &CategoryMeta,
        spec: &Record,
        operation: Operation,
        fields: &mut Record,
        errors: &mut Vec<BlogError>,
    ) {
        let Some(value) = spec.get(ID_FIELD) else {
            errors.push(BlogError::new(
                ErrorCode::MissingField,
                format!("{} of {} requires an 'id'", operation, meta.category),
            ));
            return;
        };
        let Some(field) = meta.field(ID_FIELD) else {
            return;
        };
        if let Some(value) = Self::checked_value(meta, field, value, false, errors) {
            fields.insert(ID_FIELD.to_string(), value);
        }
    }

    /// Look up a spec key, reporting `BAD_FIELD` for control or undeclared fields
    fn declared_field<'m>(
        meta: &'m CategoryMeta,
        name: &str,
        operation: Operation,
        errors: &mut Vec<BlogError>,
    ) -> Option<&'m FieldSpec> {
        if name == INDEX_FIELD || name == COUNT_FIELD {
            errors.push(BlogError::new(
                ErrorCode::BadField,
                format!("'{}' is only allowed for find, not {}", name, operation),
            ));
            return None;
        }
        let field = meta.field(name);
        if field.is_none() {
            errors.push(BlogError::new(
                ErrorCode::BadField,
                format!("unknown field '{}' for {}", name, meta.category),
            ));
        }
        field
    }

    fn server_managed(meta: &CategoryMeta, field: &FieldSpec) -> BlogError {
        BlogError::new(
            ErrorCode::BadField,
            format!(
                "field '{}' of {} is set by the server",
                field.name, meta.category
            ),
        )
    }

    /// Format-check a value and return its normalized form
    fn checked_value(
        meta: &CategoryMeta,
        field: &FieldSpec,
        value: &Value,
        predicate: bool,
        errors: &mut Vec<BlogError>,
    ) -> Option<Value> {
        let value = Self::normalize(field.kind, value);
        let ok = if predicate {
            field.kind.accepts_predicate(&value)
        } else {
            field.kind.accepts(&value)
        };
        if ok {
            Some(value)
        } else {
            errors.push(BlogError::new(
                ErrorCode::BadFieldValue,
                format!(
                    "{} field '{}' of {} {}",
                    field.friendly_name,
                    field.name,
                    meta.category,
                    field.kind.requirement()
                ),
            ));
            None
        }
    }

    /// Trim surrounding whitespace from strings, including list elements
    fn normalize(kind: FieldKind, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(s.trim().to_string()),
            Value::Array(items) if kind.is_list() => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Value::String(s.trim().to_string()),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// `_index` / `_count` arrive as JSON numbers or as strings from query parameters
    fn parse_count(value: &Value) -> Option<usize> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<usize>().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_COUNT;
    use serde_json::json;

    fn spec(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn codes(result: BlogResult<Sanitized>) -> Vec<ErrorCode> {
        result.unwrap_err().codes()
    }

    fn valid_user() -> Record {
        spec(json!({
            "id": "bob",
            "email": "bob@example.com",
            "firstName": "Bob",
            "lastName": "Smith"
        }))
    }

    #[test]
    fn unknown_category_name_is_bad_category() {
        let result = Validator::validate_named("posts", Operation::Find, &Record::new());
        assert_eq!(codes(result), vec![ErrorCode::BadCategory]);
    }

    #[test]
    fn create_reports_exactly_the_missing_fields() {
        for category in Category::ALL {
            let meta = category.meta();
            for missing in meta.required_fields() {
                let mut spec = Record::new();
                for field in meta.required_fields().filter(|f| f.name != missing.name) {
                    spec.insert(field.name.to_string(), sample_value(field.kind));
                }
                let err = Validator::validate(category, Operation::Create, &spec).unwrap_err();
                assert_eq!(err.codes(), vec![ErrorCode::MissingField], "{}", category);
                assert!(err.messages().contains(missing.name));
            }
        }
    }

    fn sample_value(kind: FieldKind) -> Value {
        match kind {
            FieldKind::Id => json!("x1"),
            FieldKind::Text => json!("some text"),
            FieldKind::Name => json!("Ann"),
            FieldKind::Email => json!("ann@example.com"),
            FieldKind::Date => json!("2000-01-01"),
            FieldKind::Time => json!("2024-01-01T00:00:00Z"),
            FieldKind::Roles => json!(["author"]),
            FieldKind::Keywords => json!(["rust"]),
        }
    }

    #[test]
    fn create_fills_defaults_and_trims() {
        let mut user = valid_user();
        user.insert("firstName".into(), json!("  Bob "));
        let sanitized = Validator::validate(Category::Users, Operation::Create, &user).unwrap();
        assert_eq!(sanitized.fields["firstName"], json!("Bob"));
        assert_eq!(sanitized.fields["roles"], json!([]));
        assert_eq!(sanitized.id(), Some("bob"));
        assert!(sanitized.page.is_none());
    }

    #[test]
    fn create_collects_every_violation() {
        let user = spec(json!({
            "id": "bob smith",
            "email": "nope",
            "nickname": "bobby",
            "creationTime": "2024-01-01T00:00:00Z",
            "_count": 3
        }));
        let err = Validator::validate(Category::Users, Operation::Create, &user).unwrap_err();
        let codes = err.codes();
        assert_eq!(
            codes.iter().filter(|c| **c == ErrorCode::BadFieldValue).count(),
            2
        );
        assert_eq!(codes.iter().filter(|c| **c == ErrorCode::BadField).count(), 3);
        assert_eq!(
            codes.iter().filter(|c| **c == ErrorCode::MissingField).count(),
            2
        );
    }

    #[test]
    fn articles_may_omit_id() {
        let article = spec(json!({
            "title": "Hello",
            "content": "World",
            "authorId": "bob"
        }));
        let sanitized =
            Validator::validate(Category::Articles, Operation::Create, &article).unwrap();
        assert_eq!(sanitized.id(), None);
        assert_eq!(sanitized.fields["keywords"], json!([]));
    }

    #[test]
    fn update_requires_id() {
        let result = Validator::validate(
            Category::Users,
            Operation::Update,
            &spec(json!({ "firstName": "Rob" })),
        );
        assert_eq!(codes(result), vec![ErrorCode::MissingField]);
    }

    #[test]
    fn update_rejects_immutable_and_server_fields() {
        let result = Validator::validate(
            Category::Comments,
            Operation::Update,
            &spec(json!({
                "id": "c1",
                "articleId": "a2",
                "updateTime": "2024-01-01T00:00:00Z"
            })),
        );
        assert_eq!(codes(result), vec![ErrorCode::BadField, ErrorCode::BadField]);
    }

    #[test]
    fn update_keeps_only_given_fields() {
        let sanitized = Validator::validate(
            Category::Users,
            Operation::Update,
            &spec(json!({ "id": "bob", "lastName": "Jones" })),
        )
        .unwrap();
        assert_eq!(sanitized.fields, spec(json!({ "id": "bob", "lastName": "Jones" })));
    }

    #[test]
    fn find_splits_out_paging() {
        let sanitized = Validator::validate(
            Category::Users,
            Operation::Find,
            &spec(json!({ "_index": "10", "_count": 5, "roles": "admin" })),
        )
        .unwrap();
        assert_eq!(sanitized.page, Some(Page { index: 10, count: 5 }));
        assert_eq!(sanitized.fields, spec(json!({ "roles": "admin" })));
    }

    #[test]
    fn find_defaults_paging() {
        let sanitized =
            Validator::validate(Category::Comments, Operation::Find, &Record::new()).unwrap();
        assert_eq!(sanitized.page(), Page { index: 0, count: DEFAULT_COUNT });
    }

    #[test]
    fn find_rejects_bad_paging_and_unknown_fields() {
        let result = Validator::validate(
            Category::Articles,
            Operation::Find,
            &spec(json!({ "_index": "-1", "_count": "many", "rating": 5 })),
        );
        assert_eq!(
            codes(result),
            vec![
                ErrorCode::BadFieldValue,
                ErrorCode::BadFieldValue,
                ErrorCode::BadField
            ]
        );
    }

    #[test]
    fn find_accepts_server_managed_fields() {
        let result = Validator::validate(
            Category::Articles,
            Operation::Find,
            &spec(json!({ "creationTime": "2024-01-01T00:00:00.000Z" })),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn remove_requires_only_id() {
        let missing = Validator::validate(Category::Articles, Operation::Remove, &Record::new());
        assert_eq!(codes(missing), vec![ErrorCode::MissingField]);

        let extra = Validator::validate(
            Category::Articles,
            Operation::Remove,
            &spec(json!({ "id": "a1", "title": "x" })),
        );
        assert_eq!(codes(extra), vec![ErrorCode::BadField]);

        let ok = Validator::validate(
            Category::Articles,
            Operation::Remove,
            &spec(json!({ "id": "a1" })),
        )
        .unwrap();
        assert_eq!(ok.id(), Some("a1"));
    }
}
