//! Structured errors shared by the validator, the reference tracker and every store.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Category is not one of users, articles, comments
    BadCategory,
    /// Unknown field, or a field not allowed for the operation
    BadField,
    /// Field value does not meet its format
    BadFieldValue,
    /// Required field absent
    MissingField,
    /// Unknown id, blocked removal, or dangling foreign key
    BadId,
    /// Create with an id that is already taken
    Exists,
    /// Backend failure
    Db,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadCategory => "BAD_CATEGORY",
            ErrorCode::BadField => "BAD_FIELD",
            ErrorCode::BadFieldValue => "BAD_FIELD_VALUE",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::BadId => "BAD_ID",
            ErrorCode::Exists => "EXISTS",
            ErrorCode::Db => "DB",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct BlogError {
    pub code: ErrorCode,
    pub message: String,
}

impl BlogError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Non-empty list of errors raised by one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(transparent)]
#[error("{}", .0.iter().join("; "))]
pub struct BlogErrors(pub Vec<BlogError>);

pub type BlogResult<T> = Result<T, BlogErrors>;

impl BlogErrors {
    pub fn single(code: ErrorCode, message: impl Into<String>) -> Self {
        Self(vec![BlogError::new(code, message)])
    }

    /// `Ok(())` when nothing was collected
    pub fn check(errors: Vec<BlogError>) -> BlogResult<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self(errors))
        }
    }

    pub fn codes(&self) -> Vec<ErrorCode> {
        self.0.iter().map(|e| e.code).collect()
    }

    pub fn first_code(&self) -> ErrorCode {
        self.0.first().map(|e| e.code).unwrap_or(ErrorCode::Db)
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.0.iter().any(|e| e.code == code)
    }

    pub fn messages(&self) -> String {
        self.0.iter().map(|e| e.message.as_str()).join("; ")
    }
}

impl From<BlogError> for BlogErrors {
    fn from(error: BlogError) -> Self {
        Self(vec![error])
    }
}

impl From<sqlx::Error> for BlogErrors {
    fn from(error: sqlx::Error) -> Self {
        log::error!("database error: {}", error);
        Self::single(ErrorCode::Db, format!("database error: {}", error))
    }
}
