use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    Json as RequestJson,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::logic::{unknown_id, Validator};
use crate::model::{
    all_meta, BlogError, BlogErrors, BlogResult, Category, ErrorCode, Operation, Page, Record,
    ID_FIELD,
};
use crate::store::traits::BlogStore;

pub type AppState<S> = Arc<S>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub errors: Vec<BlogError>,
}

impl From<&BlogErrors> for ErrorResponse {
    fn from(errors: &BlogErrors) -> Self {
        Self {
            code: errors.first_code(),
            message: errors.messages(),
            errors: errors.0.clone(),
        }
    }
}

/// HTTP status for an error list, decided by its first code
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::BadCategory => StatusCode::NOT_FOUND,
        ErrorCode::Exists => StatusCode::CONFLICT,
        ErrorCode::Db => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::BadField
        | ErrorCode::BadFieldValue
        | ErrorCode::MissingField
        | ErrorCode::BadId => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for BlogErrors {
    fn into_response(self) -> Response {
        let status = status_for(self.first_code());
        if status.is_server_error() {
            log::error!("request failed: {}", self);
        } else {
            log::warn!("request rejected: {}", self);
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub rel: &'static str,
    pub name: &'static str,
    pub href: String,
}

impl Link {
    fn new(rel: &'static str, name: &'static str, href: impl Into<String>) -> Self {
        Self {
            rel,
            name,
            href: href.into(),
        }
    }
}

/// Absolute URL of the request without query string or trailing slash.
/// The scheme follows `X-Forwarded-Proto` when a proxy terminates TLS.
fn request_url(headers: &HeaderMap, uri: &Uri) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get(FORWARDED_PROTO)
        .and_then(|h| h.to_str().ok())
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .filter(|p| matches!(*p, "http" | "https"))
        .unwrap_or("http");
    format!("{}://{}{}", scheme, host, uri.path().trim_end_matches('/'))
}

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Request body as a record; anything that is not a JSON object is a `BAD_FIELD_VALUE`
fn json_body(body: Result<RequestJson<Record>, JsonRejection>) -> BlogResult<Record> {
    body.map(|RequestJson(record)| record).map_err(|rejection| {
        BlogErrors::single(
            ErrorCode::BadFieldValue,
            format!("request body must be a JSON object: {}", rejection.body_text()),
        )
    })
}

/// `self`, plus `next` when the page came back full and `prev` when not at the start
pub fn pagination_links(base: &str, page: Page, returned: usize) -> Vec<Link> {
    let href = |index: usize| format!("{}?_index={}&_count={}", base, index, page.count);
    let mut links = vec![Link::new("self", "self", href(page.index))];
    if page.count > 0 && returned == page.count {
        links.push(Link::new("next", "next", href(page.index + page.count)));
    }
    if page.index > 0 {
        links.push(Link::new(
            "prev",
            "prev",
            href(page.index.saturating_sub(page.count)),
        ));
    }
    links
}

fn with_self_link(mut record: Record, href: String) -> Record {
    record.insert("links".to_string(), json!([Link::new("self", "self", href)]));
    record
}

fn id_spec(id: String) -> Record {
    let mut spec = Record::new();
    spec.insert(ID_FIELD.to_string(), Value::String(id));
    spec
}

pub async fn index(headers: HeaderMap, uri: Uri) -> Json<Value> {
    let base = request_url(&headers, &uri);
    let mut links = vec![
        Link::new("self", "self", base.clone()),
        Link::new("describedby", "meta", format!("{}/meta", base)),
    ];
    for category in Category::ALL {
        links.push(Link::new(
            "collection",
            category.as_str(),
            format!("{}/{}", base, category),
        ));
    }
    Json(json!({ "links": links }))
}

pub async fn get_meta(headers: HeaderMap, uri: Uri) -> Json<Value> {
    let mut meta = all_meta();
    if let Value::Object(map) = &mut meta {
        map.insert(
            "links".to_string(),
            json!([Link::new("self", "self", request_url(&headers, &uri))]),
        );
    }
    Json(meta)
}

pub async fn list_category<S: BlogStore>(
    State(store): State<AppState<S>>,
    Path(category): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Value>, BlogErrors> {
    let category: Category = category.parse()?;
    let spec: Record = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    // The store validates the spec on its own; the page is only needed here for the links
    let page = Validator::validate(category, Operation::Find, &spec)?.page();

    let records = store.find(category, &spec).await?;
    let base = request_url(&headers, &uri);
    let returned = records.len();
    let items: Vec<Record> = records
        .into_iter()
        .map(|record| {
            let id = record.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default();
            let href = format!("{}/{}", base, id);
            with_self_link(record, href)
        })
        .collect();

    Ok(Json(json!({
        category.as_str(): items,
        "links": pagination_links(&base, page, returned),
    })))
}

pub async fn get_object<S: BlogStore>(
    State(store): State<AppState<S>>,
    Path((category, id)): Path<(String, String)>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Record>, Response> {
    let category: Category = category.parse().map_err(|e: BlogErrors| e.into_response())?;
    let found = store
        .find(category, &id_spec(id.clone()))
        .await
        .map_err(|e| e.into_response())?;
    let Some(record) = found.into_iter().next() else {
        let errors = unknown_id(category, &id);
        log::warn!("request rejected: {}", errors);
        return Err((StatusCode::NOT_FOUND, Json(ErrorResponse::from(&errors))).into_response());
    };
    Ok(Json(with_self_link(record, request_url(&headers, &uri))))
}

pub async fn create_object<S: BlogStore>(
    State(store): State<AppState<S>>,
    Path(category): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    body: Result<RequestJson<Record>, JsonRejection>,
) -> Result<Response, BlogErrors> {
    let category: Category = category.parse()?;
    let body = json_body(body)?;
    let id = store.create(category, &body).await?;
    let location = format!("{}/{}", request_url(&headers, &uri), id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "id": id })),
    )
        .into_response())
}

pub async fn update_object<S: BlogStore>(
    State(store): State<AppState<S>>,
    Path((category, id)): Path<(String, String)>,
    body: Result<RequestJson<Record>, JsonRejection>,
) -> Result<Json<Value>, BlogErrors> {
    let category: Category = category.parse()?;
    let mut body = json_body(body)?;
    body.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    store.update(category, &body).await?;
    Ok(Json(json!({ "id": id })))
}

pub async fn delete_object<S: BlogStore>(
    State(store): State<AppState<S>>,
    Path((category, id)): Path<(String, String)>,
) -> Result<Json<Value>, BlogErrors> {
    let category: Category = category.parse()?;
    store.remove(category, &id_spec(id.clone())).await?;
    Ok(Json(json!({ "id": id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn codes_map_to_stable_statuses() {
        assert_eq!(status_for(ErrorCode::BadCategory), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCode::Exists), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorCode::BadId), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCode::MissingField), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCode::Db), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn first_page_links_forward_only_when_full() {
        let page = Page { index: 0, count: 5 };
        let links = pagination_links("http://h/users", page, 5);
        let rels: Vec<_> = links.iter().map(|l| l.rel).collect();
        assert_eq!(rels, vec!["self", "next"]);
        assert_eq!(links[1].href, "http://h/users?_index=5&_count=5");

        let short = pagination_links("http://h/users", page, 3);
        assert_eq!(short.len(), 1);
    }

    #[test]
    fn later_pages_link_back() {
        let page = Page { index: 3, count: 5 };
        let links = pagination_links("http://h/users", page, 2);
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].rel, "prev");
        assert_eq!(links[1].href, "http://h/users?_index=0&_count=5");
    }

    #[test]
    fn request_url_follows_forwarded_scheme() {
        let uri: Uri = "/users/ann/".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("blog.example.com"));
        assert_eq!(request_url(&headers, &uri), "http://blog.example.com/users/ann");

        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("https, http"));
        assert_eq!(request_url(&headers, &uri), "https://blog.example.com/users/ann");

        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("gopher"));
        assert_eq!(request_url(&headers, &uri), "http://blog.example.com/users/ann");
    }

    #[test]
    fn error_body_carries_every_error() {
        let errors = BlogErrors(vec![
            BlogError::new(ErrorCode::BadField, "unknown field 'x' for users"),
            BlogError::new(ErrorCode::MissingField, "missing email"),
        ]);
        let body = serde_json::to_value(ErrorResponse::from(&errors)).unwrap();
        assert_eq!(body["code"], "BAD_FIELD");
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    }
}
