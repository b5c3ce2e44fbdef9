use std::{future::Future, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, storage::BlobStore};

/// Which file slot of a book an upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Cover,
    Pdf,
}

impl FileKind {
    /// Multipart field name and key suffix.
    pub fn name(self) -> &'static str {
        match self {
            FileKind::Cover => "cover",
            FileKind::Pdf => "pdf",
        }
    }

    fn accepts(self, content_type: &str) -> bool {
        match self {
            FileKind::Cover => content_type.starts_with("image/"),
            FileKind::Pdf => content_type == "application/pdf",
        }
    }
}

pub struct Upload {
    pub body: Bytes,
    pub content_type: String,
}

impl Upload {
    /// Settles the content type (declared, else sniffed) and checks it fits `kind`.
    pub fn new(kind: FileKind, body: Bytes, declared: Option<&str>) -> Result<Self, AppError> {
        if body.is_empty() {
            return Err(AppError::Validation(format!("{} file is empty", kind.name())));
        }
        let content_type = declared
            .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
            .map(str::to_owned)
            .or_else(|| sniff(&body).map(str::to_owned))
            .ok_or_else(|| {
                AppError::Validation(format!("unrecognized {} file type", kind.name()))
            })?;
        if !kind.accepts(&content_type) || ext_from_mime(&content_type).is_none() {
            return Err(AppError::Validation(format!(
                "unsupported {} type {content_type}",
                kind.name()
            )));
        }
        Ok(Self { body, content_type })
    }

    /// Accepts plain base64 or a `data:<mime>;base64,<payload>` URL.
    pub fn from_base64(kind: FileKind, data: &str) -> Result<Self, AppError> {
        let (declared, payload) = match data.strip_prefix("data:") {
            Some(rest) => {
                let (meta, payload) = rest.split_once(',').ok_or_else(|| {
                    AppError::Validation(format!("malformed {} data url", kind.name()))
                })?;
                (meta.split(';').next(), payload)
            }
            None => (None, data),
        };
        let body = STANDARD
            .decode(payload.trim())
            .map_err(|_| AppError::Validation(format!("invalid base64 in {}", kind.name())))?;
        Self::new(kind, Bytes::from(body), declared)
    }
}

fn sniff(body: &[u8]) -> Option<&'static str> {
    if body.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if body.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if body.starts_with(b"\xff\xd8\xff") {
        Some("image/jpeg")
    } else if body.starts_with(b"GIF8") {
        Some("image/gif")
    } else if body.len() >= 12 && &body[..4] == b"RIFF" && &body[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

pub fn mime_from_key(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

pub fn object_key(user_id: Uuid, book_id: Uuid, kind: FileKind, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("books/{}/{}-{}.{}", user_id, book_id, kind.name(), ext)
}

/// Blob-store access for book files. Every call runs under the store deadline.
#[derive(Clone, Copy)]
pub struct Blobs<'a> {
    store: &'a dyn BlobStore,
    limit: Duration,
}

impl<'a> Blobs<'a> {
    pub fn new(store: &'a dyn BlobStore, limit: Duration) -> Self {
        Self { store, limit }
    }

    async fn timed<T>(
        &self,
        op: &'static str,
        key: &str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(res) => res.map_err(|e| AppError::Internal(e.context(format!("{op} {key}")))),
            Err(_) => {
                warn!(
                    op,
                    key = %key,
                    timeout_ms = self.limit.as_millis() as u64,
                    "blob store call timed out"
                );
                Err(AppError::ServiceUnavailable)
            }
        }
    }

    /// Writes the upload and returns its key.
    pub async fn store_upload(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        kind: FileKind,
        upload: Upload,
    ) -> Result<String, AppError> {
        let key = object_key(user_id, book_id, kind, &upload.content_type);
        self.timed(
            "store",
            &key,
            self.store.put(&key, upload.body, &upload.content_type),
        )
        .await?;
        Ok(key)
    }

    pub async fn fetch(&self, key: &str) -> Result<Option<Bytes>, AppError> {
        self.timed("fetch", key, self.store.get(key)).await
    }

    /// Best-effort removal; a leftover blob is logged, not fatal.
    pub async fn discard(&self, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            if let Err(e) = self.timed("delete", &key, self.store.delete(&key)).await {
                warn!(error = %e, key = %key, "failed to delete stored file");
            }
        }
    }
}
