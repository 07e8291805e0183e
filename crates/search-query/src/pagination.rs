//! Offset and cursor pagination arithmetic.

use serde::Serialize;

use crate::error::QueryError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Check a page size against `1..=MAX_PAGE_SIZE`, defaulting when absent.
pub fn page_size(name: &str, value: Option<u32>) -> Result<u32, QueryError> {
    let value = value.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&value) {
        return Err(QueryError::validation(format!(
            "{name} must be between 1 and {MAX_PAGE_SIZE}, got {value}"
        )));
    }
    Ok(value)
}

/// A 1-based page of `page_size` hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPage {
    pub page: u32,
    pub page_size: u32,
}

impl OffsetPage {
    pub fn new(page: Option<u32>, size: Option<u32>) -> Result<Self, QueryError> {
        let page = page.unwrap_or(1);
        if page < 1 {
            return Err(QueryError::validation("page must be at least 1"));
        }
        Ok(Self {
            page,
            page_size: page_size("page_size", size)?,
        })
    }

    /// Number of hits to skip.
    pub fn from(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn meta(&self, total_records: u64, selected_fields: Option<Vec<String>>) -> PaginationMeta {
        let total_pages = total_pages(total_records, self.page_size);
        PaginationMeta {
            total_records,
            page_size: self.page_size,
            current_page: Some(self.page),
            total_pages: Some(total_pages),
            has_next: u64::from(self.page) < total_pages,
            has_previous: self.page > 1,
            next_cursor: None,
            selected_fields,
        }
    }
}

pub fn total_pages(total_records: u64, page_size: u32) -> u64 {
    total_records.div_ceil(u64::from(page_size.max(1)))
}

/// Metadata for a cursor page of `size` requested hits.
///
/// A supplied cursor implies a previous page; a full page implies there may
/// be a next one, reachable through `next_cursor`.
pub fn cursor_meta(
    total_records: u64,
    size: u32,
    returned: usize,
    had_cursor: bool,
    next_cursor: Option<String>,
    selected_fields: Option<Vec<String>>,
) -> PaginationMeta {
    let has_next = returned > 0 && returned == size as usize;
    PaginationMeta {
        total_records,
        page_size: size,
        current_page: None,
        total_pages: None,
        has_next,
        has_previous: had_cursor,
        next_cursor: if has_next { next_cursor } else { None },
        selected_fields,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub total_records: u64,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    pub has_next: bool,
    pub has_previous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub selected_fields: Option<Vec<String>>,
}
