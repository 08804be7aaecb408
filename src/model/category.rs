use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::{BlogError, BlogErrors, CategoryMeta, ErrorCode, ARTICLES_META, COMMENTS_META, USERS_META};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Users,
    Articles,
    Comments,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Users, Category::Articles, Category::Comments];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Users => "users",
            Category::Articles => "articles",
            Category::Comments => "comments",
        }
    }

    /// Field metadata for this category
    pub fn meta(&self) -> &'static CategoryMeta {
        match self {
            Category::Users => &USERS_META,
            Category::Articles => &ARTICLES_META,
            Category::Comments => &COMMENTS_META,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = BlogErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                BlogError::new(
                    ErrorCode::BadCategory,
                    format!(
                        "unknown category '{}'; must be one of users, articles, comments",
                        s
                    ),
                )
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_categories() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn rejects_unknown_category() {
        let err = "posts".parse::<Category>().unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::BadCategory]);
        assert!(err.to_string().contains("posts"));
    }

    #[test]
    fn meta_table_matches_variant() {
        for category in Category::ALL {
            assert_eq!(category.meta().category, category);
        }
    }
}
