use serde::{Deserialize, Serialize};

/// A paged listing of library items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedItems<T> {
    pub items: Vec<T>,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
    pub total: i64,
}

/// Query options for paged library listings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryQuery {
    pub search: Option<String>,
    pub in_library: Option<bool>,
    pub limit: usize,
    pub offset: usize,
    pub order_by: OrderBy,
}

impl Default for LibraryQuery {
    fn default() -> Self {
        Self {
            search: None,
            in_library: None,
            limit: 500,
            offset: 0,
            order_by: OrderBy::SortName,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    SortName,
    Name,
    TimestampAdded,
    TimestampModified,
}

impl OrderBy {
    /// Column expression for the ORDER BY clause. Fixed set: user input maps
    /// onto this enum, never into SQL directly.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::SortName => "sort_name ASC",
            Self::Name => "name ASC",
            Self::TimestampAdded => "timestamp_added DESC",
            Self::TimestampModified => "timestamp_modified DESC",
        }
    }
}
