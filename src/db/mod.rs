pub mod listings;
pub mod messages;
pub mod profiles;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime,
    UtcOffset,
};

pub use listings::Listing;
pub use messages::Message;
pub use profiles::Profile;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownChoice {
    kind: &'static str,
    value: String,
}

/// Declares one of the fixed choice lists stored as its display label.
macro_rules! choices {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                #[sqlx(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            pub fn labels() -> impl Iterator<Item = &'static str> {
                Self::ALL.iter().map(|choice| choice.as_str())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    _ => Err(UnknownChoice {
                        kind: stringify!($name),
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

choices!(Role {
    Student => "Student",
    Parent => "Parent",
    Teacher => "Teacher",
    Admin => "Admin",
});

choices!(School {
    Hockaday => "The Hockaday School",
    StMarks => "St. Mark's School of Texas",
});

choices!(Category {
    Textbooks => "Textbooks",
    Calculators => "Calculators",
    Uniforms => "Uniforms",
    Backpacks => "Backpacks",
    SportsGear => "Sports Gear",
    TripSupplies => "Trip Supplies",
    Other => "Other",
});

choices!(Condition {
    New => "New",
    LikeNew => "Like New",
    Used => "Used",
    Damaged => "Damaged",
});

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

impl Default for School {
    fn default() -> Self {
        School::Hockaday
    }
}

/// Fixed width so that stored timestamps sort by text in time order.
const STAMP: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
);

/// Text form used for every timestamp column.
pub fn stamp(at: OffsetDateTime) -> Result<String, sqlx::Error> {
    at.to_offset(UtcOffset::UTC)
        .format(STAMP)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub fn now() -> Result<String, sqlx::Error> {
    stamp(OffsetDateTime::now_utc())
}

/// Opens the pool and applies the embedded schema migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;

    Ok(db_pool)
}
