use serde::{Deserialize, Serialize};

use super::repo_types::BookStatus;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub genre: Option<String>,
    pub status: Option<BookStatus>,
    pub total_pages: Option<i32>,
    pub current_page: Option<i32>,
    pub rating: Option<f64>,
    pub review: Option<String>,
    pub premise: Option<String>,
    /// Base64 or data URL.
    #[serde(alias = "cover_path")]
    pub cover_image: Option<String>,
    /// Base64 or data URL.
    #[serde(alias = "pdf_path")]
    pub pdf: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub status: Option<BookStatus>,
    pub total_pages: Option<i32>,
    pub current_page: Option<i32>,
    pub rating: Option<f64>,
    pub review: Option<String>,
    pub premise: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<BookStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl ListQuery {
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 200), self.offset.max(0))
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Trims a required text field, rejecting it when blank.
pub fn required(field: &str, value: &str) -> Result<String, AppError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(v.to_string())
}

/// Checks reading progress and rating on the values the row will end up with.
pub fn check_progress(
    total_pages: Option<i32>,
    current_page: Option<i32>,
    rating: Option<f64>,
) -> Result<(), AppError> {
    if total_pages.is_some_and(|p| p < 0) || current_page.is_some_and(|p| p < 0) {
        return Err(AppError::Validation("page counts must not be negative".into()));
    }
    if let (Some(total), Some(current)) = (total_pages, current_page) {
        if current > total {
            return Err(AppError::Validation(
                "current_page must not exceed total_pages".into(),
            ));
        }
    }
    if let Some(r) = rating {
        if !(0.0..=5.0).contains(&r) {
            return Err(AppError::Validation("rating must be between 0 and 5".into()));
        }
    }
    Ok(())
}
