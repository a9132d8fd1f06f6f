//! Read facade over the audit store: pagination bounds-checking and nothing
//! else.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api_error::{ApiError, ApiResult};
use crate::app::AppState;
use crate::store::{Page, StoreError};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw query-string values; parsed by hand so bad input gets the service
/// error envelope instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub size: Option<String>,
}

fn parse_param(raw: Option<&String>, default: i64, code: &'static str) -> ApiResult<i64> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<i64>().map_err(|_| ApiError::BadRequest {
            code,
            message: Some(format!("`{value}` is not an integer")),
        }),
    }
}

/// page >= 0, size >= 1; size is clamped to [`MAX_PAGE_SIZE`] so a dashboard
/// cannot request an unbounded scan.
pub fn parse_pagination(params: &PageParams) -> ApiResult<(i64, i64)> {
    let page = parse_param(params.page.as_ref(), 0, "invalid_page")?;
    if page < 0 {
        return Err(ApiError::bad_request("invalid_page"));
    }
    let size = parse_param(params.size.as_ref(), DEFAULT_PAGE_SIZE, "invalid_size")?;
    if size < 1 {
        return Err(ApiError::bad_request("invalid_size"));
    }
    Ok((page, size.min(MAX_PAGE_SIZE)))
}

/// `GET /api/logs?page=&size=` -> newest-first page of audit records. An
/// empty store is an empty page, never an error.
pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page>> {
    let (page, size) = parse_pagination(&params)?;
    let result = state.store.query(page, size).await.map_err(|err| match err {
        StoreError::Unavailable => ApiError::Unavailable { code: "store_unavailable" },
        StoreError::Database(err) => ApiError::internal(err),
    })?;
    Ok(Json(result))
}
