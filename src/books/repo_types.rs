use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Reading status, stored as the `book_status` Postgres enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "book_status", rename_all = "snake_case")]
pub enum BookStatus {
    Read,
    #[default]
    ToRead,
    Reading,
}

/// Book record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Book {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub cover_path: Option<String>, // blob-store key
    pub pdf_path: Option<String>,   // blob-store key
    pub total_pages: Option<i32>,
    pub current_page: Option<i32>,
    pub rating: Option<f64>,
    pub review: Option<String>,
    pub premise: Option<String>,
    pub status: BookStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub cover_path: Option<String>,
    pub pdf_path: Option<String>,
    pub total_pages: Option<i32>,
    pub current_page: Option<i32>,
    pub rating: Option<f64>,
    pub review: Option<String>,
    pub premise: Option<String>,
    pub status: BookStatus,
}

/// Column updates; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub cover_path: Option<String>,
    pub pdf_path: Option<String>,
    pub total_pages: Option<i32>,
    pub current_page: Option<i32>,
    pub rating: Option<f64>,
    pub review: Option<String>,
    pub premise: Option<String>,
    pub status: Option<BookStatus>,
}
