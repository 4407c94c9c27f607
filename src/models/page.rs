use super::cursor::Cursor;
use super::filters::Filters;
use super::row::Row;

/// A keyset page request handed to the row store.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// Fetch generation; results of older generations are discarded.
    pub generation: u64,
    pub tenant_id: String,
    pub table: String,
    pub filters: Filters,
    /// `None` requests the first page.
    pub cursor: Option<Cursor>,
    pub page_size: usize,
}

impl PageRequest {
    pub fn is_first_page(&self) -> bool {
        self.cursor.is_none()
    }
}

/// One fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    /// Position of the last row; `None` when the page was short.
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

impl Page {
    /// Build a page from ordered rows, deriving the frontier cursor.
    pub fn from_rows(rows: Vec<Row>, page_size: usize) -> Self {
        if rows.len() < page_size {
            return Self {
                rows,
                next_cursor: None,
                has_more: false,
            };
        }
        let next_cursor = rows.last().map(Cursor::of);
        Self {
            has_more: next_cursor.is_some(),
            rows,
            next_cursor,
        }
    }
}
