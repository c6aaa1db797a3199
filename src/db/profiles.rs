use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Role, School};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub school: School,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ProfileFields {
    pub name: String,
    pub role: Role,
    pub school: School,
}

pub async fn get(db_pool: &SqlitePool, id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as("SELECT id,name,email,role,school,updated_at FROM profiles WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await
}

/// Fetches the profiles among `ids`, in no particular order.
pub async fn get_many(db_pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Profile>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT id,name,email,role,school,updated_at FROM profiles WHERE id IN (",
    );
    let mut separated = query.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    query.build_query_as().fetch_all(db_pool).await
}

/// Inserts the profile, or overwrites every field of an existing one.
pub async fn upsert(
    db_pool: &SqlitePool,
    id: Uuid,
    email: &str,
    ProfileFields { name, role, school }: ProfileFields,
) -> Result<Profile, sqlx::Error> {
    sqlx::query_as(
        r#"INSERT INTO profiles (id,name,email,role,school,updated_at) VALUES (?,?,?,?,?,?)
        ON CONFLICT(id) DO UPDATE SET
            name=excluded.name, email=excluded.email, role=excluded.role,
            school=excluded.school, updated_at=excluded.updated_at
        RETURNING id,name,email,role,school,updated_at"#,
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(role)
    .bind(school)
    .bind(super::now()?)
    .fetch_one(db_pool)
    .await
}

/// Saves `fields` only if the stored profile is still at version `seen`.
/// Returns `None` when someone else saved in between.
pub async fn update(
    db_pool: &SqlitePool,
    id: Uuid,
    seen: OffsetDateTime,
    ProfileFields { name, role, school }: ProfileFields,
) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as(
        r#"UPDATE profiles SET name=?, role=?, school=?, updated_at=?
        WHERE id=? AND updated_at=?
        RETURNING id,name,email,role,school,updated_at"#,
    )
    .bind(name)
    .bind(role)
    .bind(school)
    .bind(super::now()?)
    .bind(id)
    .bind(super::stamp(seen)?)
    .fetch_optional(db_pool)
    .await
}
