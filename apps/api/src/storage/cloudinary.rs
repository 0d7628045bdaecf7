//! CDN-backed image storage via Cloudinary's signed upload API.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::CloudinaryConfig;
use crate::storage::{FileFormat, StorageAdapter, StorageError};

const CLOUDINARY_API_URL: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct CloudinaryAdapter {
    http: Client,
    config: CloudinaryConfig,
    folder: String,
}

impl CloudinaryAdapter {
    pub fn new(config: CloudinaryConfig, folder: String) -> Result<Self, StorageError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StorageError::Response(e.to_string()))?;
        Ok(Self {
            http,
            config,
            folder,
        })
    }

    fn upload_url(&self) -> String {
        format!(
            "{CLOUDINARY_API_URL}/{}/image/upload",
            self.config.cloud_name
        )
    }
}

/// Builds the string Cloudinary signs: params sorted by name, joined as
/// `k=v&k=v`, with the API secret appended.
pub fn string_to_sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{joined}{api_secret}")
}

pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    format!(
        "{:x}",
        Sha256::digest(string_to_sign(params, api_secret).as_bytes())
    )
}

#[async_trait]
impl StorageAdapter for CloudinaryAdapter {
    async fn upload(
        &self,
        data: Bytes,
        file_name: &str,
        format: FileFormat,
    ) -> Result<String, StorageError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signed = [
            ("folder", self.folder.as_str()),
            ("public_id", file_name),
            ("timestamp", timestamp.as_str()),
        ];
        let signature = sign(&signed, &self.config.api_secret);

        let part = Part::bytes(data.to_vec())
            .file_name(format!("upload.{}", format.extension()))
            .mime_str(format.content_type())
            .map_err(|e| StorageError::Response(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("folder", self.folder.clone())
            .text("public_id", file_name.to_string())
            .text("timestamp", timestamp.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let upload_error = |message: String| StorageError::Upload {
            key: file_name.to_string(),
            message,
        };

        let response = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(upload_error(format!("status {status}: {message}")));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Response(e.to_string()))?;

        let url = uploaded
            .secure_url
            .or(uploaded.url)
            .ok_or_else(|| StorageError::Response("upload result has no URL".to_string()))?;

        info!("Uploaded {file_name} to Cloudinary folder {}", self.folder);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_sign_sorts_params() {
        let s = string_to_sign(
            &[
                ("timestamp", "1315060510"),
                ("public_id", "sample_image"),
                ("folder", "stashspot"),
            ],
            "abcd",
        );
        assert_eq!(
            s,
            "folder=stashspot&public_id=sample_image&timestamp=1315060510abcd"
        );
    }

    #[test]
    fn test_string_to_sign_skips_empty_values() {
        let s = string_to_sign(&[("folder", ""), ("timestamp", "1")], "secret");
        assert_eq!(s, "timestamp=1secret");
    }

    #[test]
    fn test_signature_is_hex_sha256() {
        let sig = sign(&[("timestamp", "1")], "secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sig, sign(&[("timestamp", "1")], "secret"));
        assert_ne!(sig, sign(&[("timestamp", "2")], "secret"));
    }
}
