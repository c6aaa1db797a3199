use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::feed::{ChangeFeed, Row};

use super::{Category, Condition, School};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: Category,
    pub condition: Condition,
    pub school: School,
    pub image_url: Option<String>,
    pub user_id: Uuid,
    pub seller_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: Category,
    pub condition: Condition,
    pub school: School,
    pub image_url: Option<String>,
    pub user_id: Uuid,
    pub seller_name: String,
}

/// Browse filters. `None` stands for "all".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub category: Option<Category>,
    pub school: Option<School>,
    /// Case-insensitive title substring.
    pub search: Option<String>,
}

const COLUMNS: &str =
    "id,title,description,price,category,condition,school,image_url,user_id,seller_name,created_at";

/// Inserts the listing and announces it on the change feed.
pub async fn create(
    db_pool: &SqlitePool,
    feed: &ChangeFeed,
    new: NewListing,
) -> Result<Listing, sqlx::Error> {
    let id = Uuid::now_v7();
    let listing: Listing = sqlx::query_as(&format!(
        "INSERT INTO listings ({COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?,?) RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.price)
    .bind(new.category)
    .bind(new.condition)
    .bind(new.school)
    .bind(&new.image_url)
    .bind(new.user_id)
    .bind(&new.seller_name)
    .bind(super::now()?)
    .fetch_one(db_pool)
    .await?;

    info!(listing_id = %listing.id, user_id = %listing.user_id, "listing created");
    feed.insert(Row::Listing(listing.clone()));

    Ok(listing)
}

pub async fn get(db_pool: &SqlitePool, id: Uuid) -> Result<Option<Listing>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM listings WHERE id=?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await
}

/// Listings matching `filter`, newest first.
pub async fn browse(db_pool: &SqlitePool, filter: &ListingFilter) -> Result<Vec<Listing>, sqlx::Error> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM listings WHERE 1=1"));

    if let Some(category) = filter.category {
        query.push(" AND category=").push_bind(category);
    }
    if let Some(school) = filter.school {
        query.push(" AND school=").push_bind(school);
    }
    if let Some(search) = &filter.search {
        query
            .push(r" AND title LIKE ")
            .push_bind(format!("%{}%", escape_like(search)))
            .push(r" ESCAPE '\'");
    }
    query.push(" ORDER BY created_at DESC");

    query.build_query_as().fetch_all(db_pool).await
}

/// The listings posted by `user_id`, newest first.
pub async fn by_owner(db_pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Listing>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM listings WHERE user_id=? ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db_pool)
    .await
}

pub async fn get_many(db_pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Listing>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM listings WHERE id IN ("));
    let mut separated = query.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    query.build_query_as().fetch_all(db_pool).await
}

/// SQLite's LIKE is already case-insensitive for ASCII; only the wildcards need care.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
