//! Pagination utilities for list endpoints

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Pagination query parameters.
///
/// `limit`/`offset` address the window directly; `page` (1-indexed) is an
/// alternative to `offset`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub page: Option<i64>,
}

impl PaginationParams {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        match (self.offset, self.page) {
            (Some(offset), _) => offset.max(0),
            (None, Some(page)) => (page.max(1) - 1) * self.limit(),
            (None, None) => 0,
        }
    }

    /// 1-indexed page the window starts on
    pub fn page(&self) -> i64 {
        self.offset() / self.limit() + 1
    }
}

/// List envelope shared by every collection endpoint
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub page: i64,
    pub total_pages: i64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        let limit = params.limit();
        Self {
            items,
            total,
            limit,
            offset: params.offset(),
            page: params.page(),
            total_pages: (total + limit - 1) / limit,
        }
    }
}

impl<T: Serialize> IntoResponse for Paginated<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let params = PaginationParams::default();
        assert_eq!((params.limit(), params.offset(), params.page()), (10, 0, 1));

        let params = PaginationParams {
            limit: Some(500),
            offset: Some(-3),
            page: None,
        };
        assert_eq!((params.limit(), params.offset()), (100, 0));
    }

    #[test]
    fn page_translates_to_offset() {
        let params = PaginationParams {
            limit: Some(20),
            offset: None,
            page: Some(3),
        };
        assert_eq!(params.offset(), 40);
        assert_eq!(params.page(), 3);

        let envelope = Paginated::new(vec![1, 2], &params, 41);
        assert_eq!(envelope.total_pages, 3);
    }
}
