//! Read-only user listing behind a bearer access token.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::response::ApiResponse;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::RequestContext;
use crate::storage::pagination::{paginate, PageQuery, SortOrder};
use crate::storage::PRIVATE_USER_KEYS;

const USER_SEARCH_KEYS: &[&str] = &["name", "email", "phoneNumber"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub sort_by: Option<String>,
    pub order_by: Option<String>,
    pub search: Option<String>,
    pub role: Option<String>,
}

impl ListUsersParams {
    fn into_query(self) -> PageQuery {
        let d = PageQuery::default();
        let mut filter = serde_json::Map::new();
        if let Some(role) = self.role {
            filter.insert("role".into(), role.to_lowercase().into());
        }
        PageQuery {
            page: self.page.unwrap_or(d.page),
            limit: self.limit.unwrap_or(d.limit),
            offset: self.offset.unwrap_or(0),
            sort_by: self.sort_by.filter(|s| !s.is_empty()).unwrap_or(d.sort_by),
            order_by: match self.order_by.as_deref() {
                Some(o) if o.eq_ignore_ascii_case("asc") => SortOrder::Asc,
                _ => SortOrder::Desc,
            },
            filter,
            search: self.search,
            search_keys: USER_SEARCH_KEYS.iter().map(|s| s.to_string()).collect(),
            exclude_keys: PRIVATE_USER_KEYS.iter().map(|s| s.to_string()).collect(),
            include_keys: Vec::new(),
        }
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<ListUsersParams>,
) -> AppResult<ApiResponse> {
    let query = params.into_query();
    let page = {
        let store = state.store.0.lock();
        paginate(store.users(), &query)?
    };
    tracing::debug!(target: "http", caller = %ctx.principal.user_id, counts = page.pagination.counts, "users.list");
    Ok(ApiResponse::ok("All users details.").with("pagination", &page.pagination).with("data", &page.data))
}

pub async fn get_user(
    State(state): State<AppState>,
    _ctx: RequestContext,
    Path(user_id): Path<String>,
) -> AppResult<ApiResponse> {
    let payload = state.store.0.lock().user_by_id(&user_id).map(|u| u.to_public_json());
    match payload {
        Some(p) => Ok(ApiResponse::ok("User details").with("payload", p)),
        None => Err(AppError::invalid_credential()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_map_onto_page_query() {
        let q = ListUsersParams {
            page: Some(3),
            order_by: Some("ASC".into()),
            role: Some("Admin".into()),
            ..Default::default()
        }
        .into_query();
        assert_eq!(q.page, 3);
        assert_eq!(q.limit, 10);
        assert_eq!(q.order_by, SortOrder::Asc);
        assert_eq!(q.sort_by, "createdAt");
        assert_eq!(q.filter["role"], "admin");
        assert!(q.exclude_keys.iter().any(|k| k == "passwordHash"));
    }
}
