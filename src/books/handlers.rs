use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{check_progress, required, CreateBookRequest, ListQuery, MessageResponse, UpdateBookRequest},
    files::{mime_from_key, FileKind, Upload},
    repo_types::{Book, BookPatch, NewBook},
};
use crate::{
    auth::{handlers::json_body, AuthUser},
    error::AppError,
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024; // 20MB

pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/", get(list_books).post(create_book))
        .route(
            "/books/:id",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/books/:id/pdf", get(get_pdf).put(put_pdf))
        .route("/books/:id/cover", get(get_cover).put(put_cover))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

fn book_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::Validation("invalid book id".into()))
}

fn not_found() -> AppError {
    AppError::NotFound("book not found".into())
}

async fn load(state: &AppState, user_id: Uuid, id: Uuid) -> Result<Book, AppError> {
    state
        .store(state.books.get(user_id, id))
        .await?
        .ok_or_else(not_found)
}

#[instrument(skip(state, query))]
pub async fn list_books(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Book>>, AppError> {
    let Query(q) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let (limit, offset) = q.clamped();
    let books = state
        .store(state.books.list(user_id, q.status, limit, offset))
        .await?;
    Ok(Json(books))
}

#[instrument(skip(state, path))]
pub async fn get_book(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Book>, AppError> {
    let id = book_id(path)?;
    Ok(Json(load(&state, user_id, id).await?))
}

/// POST /books, with optional base64 `cover_image` / `pdf`.
#[instrument(skip(state, payload))]
pub async fn create_book(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateBookRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = json_body(payload)?;
    let title = required("title", &req.title)?;
    let author = required("author", &req.author)?;
    check_progress(req.total_pages, req.current_page, req.rating)?;

    // Decode everything before writing anything.
    let cover = req
        .cover_image
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|d| Upload::from_base64(FileKind::Cover, d))
        .transpose()?;
    let pdf = req
        .pdf
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|d| Upload::from_base64(FileKind::Pdf, d))
        .transpose()?;

    let book_id = Uuid::new_v4();
    let blobs = state.blobs();

    let cover_path = match cover {
        Some(up) => Some(blobs.store_upload(user_id, book_id, FileKind::Cover, up).await?),
        None => None,
    };
    let pdf_path = match pdf {
        Some(up) => match blobs.store_upload(user_id, book_id, FileKind::Pdf, up).await {
            Ok(key) => Some(key),
            Err(e) => {
                blobs.discard(cover_path).await;
                return Err(e);
            }
        },
        None => None,
    };

    let new_book = NewBook {
        id: book_id,
        user_id,
        title,
        author,
        genre: req.genre,
        cover_path: cover_path.clone(),
        pdf_path: pdf_path.clone(),
        total_pages: req.total_pages,
        current_page: req.current_page,
        rating: req.rating,
        review: req.review,
        premise: req.premise,
        status: req.status.unwrap_or_default(),
    };
    let book = match state.store(state.books.create(new_book)).await {
        Ok(b) => b,
        Err(e) => {
            blobs.discard(cover_path.into_iter().chain(pdf_path)).await;
            return Err(e);
        }
    };

    info!(book_id = %book.id, %user_id, "book created");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/books/{}", book.id))],
        Json(book),
    ))
}

#[instrument(skip(state, path, payload))]
pub async fn update_book(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateBookRequest>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let id = book_id(path)?;
    let req = json_body(payload)?;
    let current = load(&state, user_id, id).await?;

    let title = req.title.as_deref().map(|t| required("title", t)).transpose()?;
    let author = req.author.as_deref().map(|a| required("author", a)).transpose()?;
    check_progress(
        req.total_pages.or(current.total_pages),
        req.current_page.or(current.current_page),
        req.rating.or(current.rating),
    )?;

    let patch = BookPatch {
        title,
        author,
        genre: req.genre,
        total_pages: req.total_pages,
        current_page: req.current_page,
        rating: req.rating,
        review: req.review,
        premise: req.premise,
        status: req.status,
        ..BookPatch::default()
    };
    let book = state
        .store(state.books.update(user_id, id, patch))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(book))
}

#[instrument(skip(state, path))]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = book_id(path)?;
    let book = load(&state, user_id, id).await?;

    if !state.store(state.books.delete(user_id, id)).await? {
        return Err(not_found());
    }
    state
        .blobs()
        .discard(book.cover_path.into_iter().chain(book.pdf_path))
        .await;

    info!(book_id = %id, %user_id, "book deleted");
    Ok(Json(MessageResponse {
        message: "book deleted successfully",
    }))
}

async fn serve_file(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    kind: FileKind,
) -> Result<Response, AppError> {
    let book = load(state, user_id, id).await?;
    let missing = || AppError::NotFound(format!("no {} available", kind.name()));
    let key = match kind {
        FileKind::Cover => book.cover_path,
        FileKind::Pdf => book.pdf_path,
    }
    .ok_or_else(missing)?;

    let data = state.blobs().fetch(&key).await?.ok_or_else(missing)?;
    Ok(([(header::CONTENT_TYPE, mime_from_key(&key))], data).into_response())
}

async fn replace_file(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    kind: FileKind,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Book>, AppError> {
    let mut mp = multipart.map_err(|e| AppError::Validation(e.body_text()))?;
    let book = load(state, user_id, id).await?;

    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() == Some(kind.name()) {
            let declared = field.content_type().map(str::to_owned);
            let body = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            upload = Some(Upload::new(kind, body, declared.as_deref())?);
            break;
        }
    }
    let upload = upload
        .ok_or_else(|| AppError::Validation(format!("{} field is required", kind.name())))?;

    let blobs = state.blobs();
    let key = blobs.store_upload(user_id, id, kind, upload).await?;
    let (old, patch) = match kind {
        FileKind::Cover => (
            book.cover_path,
            BookPatch {
                cover_path: Some(key.clone()),
                ..BookPatch::default()
            },
        ),
        FileKind::Pdf => (
            book.pdf_path,
            BookPatch {
                pdf_path: Some(key.clone()),
                ..BookPatch::default()
            },
        ),
    };
    let updated = match state.store(state.books.update(user_id, id, patch)).await {
        Ok(Some(b)) => b,
        outcome => {
            // A reused key already overwrote the old file; only a fresh one is orphaned.
            blobs
                .discard(Some(key.clone()).filter(|k| old.as_deref() != Some(k.as_str())))
                .await;
            return Err(outcome.err().unwrap_or_else(not_found));
        }
    };

    // Same key means the put above already overwrote it.
    blobs.discard(old.filter(|o| *o != key)).await;
    info!(book_id = %id, %user_id, kind = kind.name(), "file replaced");
    Ok(Json(updated))
}

#[instrument(skip(state, path))]
pub async fn get_pdf(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    serve_file(&state, user_id, book_id(path)?, FileKind::Pdf).await
}

#[instrument(skip(state, path))]
pub async fn get_cover(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    serve_file(&state, user_id, book_id(path)?, FileKind::Cover).await
}

#[instrument(skip(state, path, multipart))]
pub async fn put_pdf(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Book>, AppError> {
    replace_file(&state, user_id, book_id(path)?, FileKind::Pdf, multipart).await
}

#[instrument(skip(state, path, multipart))]
pub async fn put_cover(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Book>, AppError> {
    replace_file(&state, user_id, book_id(path)?, FileKind::Cover, multipart).await
}
