use std::str::FromStr;

use axum::{debug_handler, extract::{Query, State}, response::{IntoResponse, Response}};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    db::{listings::{self, ListingFilter}, Category, School},
    include_res,
    res::{self, attr},
    session::Viewer,
    AppResult, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BrowseQuery {
    category: Option<String>,
    school: Option<String>,
    search: Option<String>,
}

impl BrowseQuery {
    /// `all`, empty and unrecognised choices all mean no filter.
    fn filter(&self) -> ListingFilter {
        ListingFilter {
            category: choice(self.category.as_deref()),
            school: choice(self.school.as_deref()),
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|search| !search.is_empty())
                .map(str::to_owned),
        }
    }
}

fn choice<T: FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|value| value.parse().ok())
}

#[debug_handler(state = AppState)]
pub(crate) async fn browse(
    Query(query): Query<BrowseQuery>,
    State(db_pool): State<SqlitePool>,
    viewer: Viewer,
) -> AppResult<Response> {
    let filter = query.filter();
    let found = listings::browse(&db_pool, &filter).await?;

    let body = include_res!(str, "/pages/browse.html")
        .replace(
            "{category_options}",
            &res::options(Category::labels(), filter.category.as_ref().map(Category::as_str)),
        )
        .replace(
            "{school_options}",
            &res::options(School::labels(), filter.school.as_ref().map(School::as_str)),
        )
        .replace("{search}", &attr(filter.search.as_deref().unwrap_or_default()))
        .replace("{listings}", &super::grid(&found));

    Ok(res::page("Browse Listings", &viewer, &body).into_response())
}
