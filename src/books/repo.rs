use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Book, BookPatch, BookStatus, NewBook};
use crate::db::StoreError;

/// Row-level access to books. Every lookup is scoped to the owning user.
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn list(
        &self,
        user_id: Uuid,
        status: Option<BookStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Book>, StoreError>;
    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Book>, StoreError>;
    async fn create(&self, book: NewBook) -> Result<Book, StoreError>;
    async fn update(&self, user_id: Uuid, id: Uuid, patch: BookPatch)
        -> Result<Option<Book>, StoreError>;
    /// Returns whether a row was removed.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

const BOOK_COLUMNS: &str = "id, user_id, title, author, genre, cover_path, pdf_path, \
     total_pages, current_page, rating, review, premise, status, created_at";

#[derive(Clone)]
pub struct PgBookStore {
    db: PgPool,
}

impl PgBookStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn list(
        &self,
        user_id: Uuid,
        status: Option<BookStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Book>, StoreError> {
        let rows = sqlx::query_as::<_, Book>(&format!(
            r#"
            SELECT {BOOK_COLUMNS}
            FROM books
            WHERE user_id = $1
              AND ($2::book_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Book>, StoreError> {
        let row = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn create(&self, book: NewBook) -> Result<Book, StoreError> {
        let row = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (id, user_id, title, author, genre, cover_path, pdf_path,
                               total_pages, current_page, rating, review, premise, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(book.id)
        .bind(book.user_id)
        .bind(book.title)
        .bind(book.author)
        .bind(book.genre)
        .bind(book.cover_path)
        .bind(book.pdf_path)
        .bind(book.total_pages)
        .bind(book.current_page)
        .bind(book.rating)
        .bind(book.review)
        .bind(book.premise)
        .bind(book.status)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: BookPatch,
    ) -> Result<Option<Book>, StoreError> {
        let row = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books
               SET title        = COALESCE($3, title),
                   author       = COALESCE($4, author),
                   genre        = COALESCE($5, genre),
                   cover_path   = COALESCE($6, cover_path),
                   pdf_path     = COALESCE($7, pdf_path),
                   total_pages  = COALESCE($8, total_pages),
                   current_page = COALESCE($9, current_page),
                   rating       = COALESCE($10, rating),
                   review       = COALESCE($11, review),
                   premise      = COALESCE($12, premise),
                   status       = COALESCE($13, status)
             WHERE id = $1 AND user_id = $2
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(patch.title)
        .bind(patch.author)
        .bind(patch.genre)
        .bind(patch.cover_path)
        .bind(patch.pdf_path)
        .bind(patch.total_pages)
        .bind(patch.current_page)
        .bind(patch.rating)
        .bind(patch.review)
        .bind(patch.premise)
        .bind(patch.status)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM books WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
