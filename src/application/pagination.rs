//! Offset pagination for product listings.

use thiserror::Error;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("page must be at least 1")]
    InvalidPage,
    #[error("limit must be between 1 and {MAX_LIMIT}")]
    InvalidLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Result<Self, PaginationError> {
        if page < 1 {
            return Err(PaginationError::InvalidPage);
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(PaginationError::InvalidLimit);
        }
        Ok(Self { page, limit })
    }

    /// Build from raw query values, applying defaults for absent ones.
    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> Result<Self, PaginationError> {
        let page = match page {
            None => DEFAULT_PAGE,
            Some(value) => u32::try_from(value).map_err(|_| PaginationError::InvalidPage)?,
        };
        let limit = match limit {
            None => DEFAULT_LIMIT,
            Some(value) => u32::try_from(value).map_err(|_| PaginationError::InvalidLimit)?,
        };
        Self::new(page, limit)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}
