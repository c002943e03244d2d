//! Search API endpoints.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{success, ApiResult};
use crate::models::Issue;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// Search result with issues and metadata.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    /// Matching issues in the index, across all pages.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub issue: Issue,
    pub score: f32,
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// GET /search - Full-text search over approved issues.
pub async fn search_issues(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let limit = params.limit.min(MAX_SEARCH_LIMIT);

    let page = state.search.search(&params.q, limit, params.offset)?;

    // The index lags the database slightly; skip hits that are gone or no longer public
    let mut results = Vec::new();
    for hit in page.results {
        if let Ok(Some(issue)) = state.repo.get_public_issue(&hit.issue_id).await {
            results.push(SearchResultItem {
                issue,
                score: hit.score,
            });
        }
    }

    success(SearchResponse {
        results,
        total: page.total,
        limit,
        offset: params.offset,
    })
}
