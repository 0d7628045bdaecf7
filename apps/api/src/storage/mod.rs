//! File storage. Uploaded form files are handed to a pluggable [`StorageAdapter`]
//! which returns the public URL stored on the owning record.
//!
//! `AppState` holds an `Arc<dyn StorageAdapter>`, chosen at startup by `STORAGE_BACKEND`.

pub mod cloudinary;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::forms::UploadedFile;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("storage provider returned an unexpected response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pdf,
    Png,
    Jpeg,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Png => "png",
            FileFormat::Jpeg => "jpeg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "application/pdf",
            FileFormat::Png => "image/png",
            FileFormat::Jpeg => "image/jpeg",
        }
    }

    /// Picks the format from the part's declared content type, defaulting to JPEG.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.map(|c| c.to_ascii_lowercase()).as_deref() {
            Some("application/pdf") => FileFormat::Pdf,
            Some("image/png") => FileFormat::Png,
            _ => FileFormat::Jpeg,
        }
    }
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Stores `data` under `file_name` (no extension) and returns its public URL.
    async fn upload(
        &self,
        data: Bytes,
        file_name: &str,
        format: FileFormat,
    ) -> Result<String, StorageError>;
}

/// Where uploads land and whom they are filed under.
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub environment: String,
    pub vendor_id: String,
}

impl Default for UploadContext {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            vendor_id: "psk".to_string(),
        }
    }
}

/// Object name for one uploaded file: `{env}/{vendor padded to 5}/{ref_no}[-{page}]`.
pub fn object_file_name(
    ctx: &UploadContext,
    ref_no: &str,
    page_number: Option<usize>,
) -> String {
    let base = format!("{}/{:0>5}/", ctx.environment, ctx.vendor_id);
    match page_number {
        Some(page) => format!("{base}{ref_no}-{page}"),
        None => format!("{base}{ref_no}"),
    }
}

/// Uploads all files concurrently under one fresh reference number and returns
/// their URLs in input order. Pages are numbered only when several files go up together.
pub async fn upload_files(
    adapter: &dyn StorageAdapter,
    ctx: &UploadContext,
    files: Vec<UploadedFile>,
) -> Result<Vec<String>, StorageError> {
    if files.is_empty() {
        return Ok(vec![]);
    }

    let ref_no = Uuid::new_v4().to_string();
    let multi_page = files.len() > 1;

    let uploads = files.into_iter().enumerate().map(|(i, file)| {
        let page = multi_page.then_some(i + 1);
        let name = object_file_name(ctx, &ref_no, page);
        let format = FileFormat::from_content_type(file.content_type.as_deref());
        async move { adapter.upload(file.bytes, &name, format).await }
    });

    let urls = try_join_all(uploads).await?;
    info!("Uploaded {} file(s) under reference {ref_no}", urls.len());
    Ok(urls)
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStorage;
    use super::*;

    fn file(content_type: &str, body: &'static [u8]) -> UploadedFile {
        UploadedFile {
            file_name: Some("photo".to_string()),
            content_type: Some(content_type.to_string()),
            bytes: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_object_file_name_pads_vendor() {
        let ctx = UploadContext {
            environment: "production".to_string(),
            vendor_id: "psk".to_string(),
        };
        assert_eq!(
            object_file_name(&ctx, "ref", None),
            "production/00psk/ref"
        );
        assert_eq!(
            object_file_name(&ctx, "ref", Some(2)),
            "production/00psk/ref-2"
        );
    }

    #[test]
    fn test_format_from_content_type() {
        assert_eq!(FileFormat::from_content_type(Some("image/png")), FileFormat::Png);
        assert_eq!(
            FileFormat::from_content_type(Some("APPLICATION/PDF")),
            FileFormat::Pdf
        );
        assert_eq!(FileFormat::from_content_type(Some("image/webp")), FileFormat::Jpeg);
        assert_eq!(FileFormat::from_content_type(None), FileFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_single_upload_has_no_page_suffix() {
        let storage = MemoryStorage::default();
        let urls = upload_files(
            &storage,
            &UploadContext::default(),
            vec![file("image/png", b"png-bytes")],
        )
        .await
        .unwrap();

        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with(".png"));
        let uploads = storage.uploads.lock().unwrap();
        assert!(!uploads[0].0.ends_with("-1"));
        assert_eq!(uploads[0].2, 9);
    }

    #[tokio::test]
    async fn test_multiple_uploads_share_reference_and_keep_order() {
        let storage = MemoryStorage::default();
        let urls = upload_files(
            &storage,
            &UploadContext::default(),
            vec![file("image/jpeg", b"a"), file("image/jpeg", b"b")],
        )
        .await
        .unwrap();

        assert!(urls[0].ends_with("-1.jpeg"));
        assert!(urls[1].ends_with("-2.jpeg"));
        let prefix = |u: &str| u.rsplit_once('-').unwrap().0.to_string();
        assert_eq!(prefix(&urls[0]), prefix(&urls[1]));
    }

    #[tokio::test]
    async fn test_no_files_no_uploads() {
        let storage = MemoryStorage::default();
        let urls = upload_files(&storage, &UploadContext::default(), vec![])
            .await
            .unwrap();
        assert!(urls.is_empty());
        assert!(storage.uploads.lock().unwrap().is_empty());
    }
}
