use tracing::{debug, warn};

use crate::client::BlueskyClient;
use crate::error::{AutoPostError, Result};
use crate::http::{HttpRequest, DEFAULT_TIMEOUT};
use crate::models::{ImageBlob, Session};

/// Largest blob the service accepts for an external-link thumbnail.
pub const MAX_IMAGE_BYTES: usize = 1_000_000;

pub const SUPPORTED_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Downloads a thumbnail candidate and uploads it as a blob.
pub struct ImageIngester {
    client: BlueskyClient,
}

impl ImageIngester {
    pub fn new(client: BlueskyClient) -> Self {
        Self { client }
    }

    /// Like [`try_ingest`](Self::try_ingest) but logs the failure and returns `None`.
    pub async fn ingest(&self, image_url: &str, session: &Session) -> Option<ImageBlob> {
        match self.try_ingest(image_url, session).await {
            Ok(blob) => Some(blob),
            Err(e) => {
                warn!("Skipping thumbnail {}: {}", image_url, e);
                None
            }
        }
    }

    pub async fn try_ingest(&self, image_url: &str, session: &Session) -> Result<ImageBlob> {
        let response = self
            .client
            .transport()
            .send(HttpRequest::get(image_url, DEFAULT_TIMEOUT))
            .await?;

        if !response.is_success() {
            return Err(AutoPostError::Network(format!(
                "image download returned HTTP {}",
                response.status
            )));
        }

        let mime_type = validate_image(&response.body, response.content_type.as_deref())?;
        debug!("Uploading {} byte {} thumbnail", response.body.len(), mime_type);

        // Shares the downloaded buffer with the upload request.
        let raw_bytes = response.body;
        let blob_ref = self
            .client
            .upload_blob(session, mime_type, raw_bytes.clone())
            .await?;

        Ok(ImageBlob {
            mime_type,
            raw_bytes,
            blob_ref,
        })
    }
}

/// Checks size and type, returning the MIME type to upload with.
///
/// A declared `Content-Type` is trusted when it is an `image/*` type;
/// otherwise the type is sniffed from the leading bytes.
pub fn validate_image(bytes: &[u8], declared: Option<&str>) -> Result<&'static str> {
    if bytes.is_empty() {
        return Err(AutoPostError::Validation("Empty image data".to_string()));
    }

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AutoPostError::Validation(format!(
            "Image too large: {} bytes",
            bytes.len()
        )));
    }

    let declared = declared
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|ct| ct.starts_with("image/"));

    match declared {
        Some(ct) => SUPPORTED_TYPES
            .iter()
            .find(|supported| **supported == ct)
            .copied()
            .ok_or_else(|| AutoPostError::Validation(format!("Unsupported image type: {}", ct))),
        None => sniff_image_type(bytes).ok_or_else(|| {
            AutoPostError::Validation("Unsupported image type: unrecognized content".to_string())
        }),
    }
}

/// Identifies JPEG, PNG, GIF and WebP by their magic bytes.
pub fn sniff_image_type(header: &[u8]) -> Option<&'static str> {
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if header.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    // "RIFF....WEBP"
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DEFAULT_SERVICE_URL;
    use crate::http::Method;
    use crate::testing::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    const UPLOAD_BLOB: &str = "https://bsky.social/xrpc/com.atproto.repo.uploadBlob";
    const IMAGE_URL: &str = "https://example.com/cover.png";

    fn png(len: usize) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.resize(len, 0);
        bytes
    }

    fn session() -> Session {
        Session {
            did: "did:plc:me".to_string(),
            access_jwt: "jwt".to_string(),
            handle: None,
        }
    }

    fn ingester(transport: MockTransport) -> (Arc<MockTransport>, ImageIngester) {
        let transport = Arc::new(transport);
        let client = BlueskyClient::new(transport.clone(), DEFAULT_SERVICE_URL);
        (transport, ImageIngester::new(client))
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_size_boundary() {
        assert_eq!(validate_image(&png(MAX_IMAGE_BYTES), None).unwrap(), "image/png");

        let err = validate_image(&png(MAX_IMAGE_BYTES + 1), None).unwrap_err();
        assert!(matches!(err, AutoPostError::Validation(_)));
    }

    #[test]
    fn test_declared_image_type_is_trusted() {
        assert_eq!(
            validate_image(&[1, 2, 3], Some("image/JPEG; charset=binary")).unwrap(),
            "image/jpeg"
        );
    }

    #[test]
    fn test_non_image_header_falls_back_to_sniffing() {
        assert_eq!(
            validate_image(b"GIF89a....", Some("application/octet-stream")).unwrap(),
            "image/gif"
        );
        assert_eq!(validate_image(b"RIFF\0\0\0\0WEBPVP8 ", None).unwrap(), "image/webp");
        assert_eq!(validate_image(&[0xFF, 0xD8, 0xFF, 0xE0], None).unwrap(), "image/jpeg");
    }

    #[test]
    fn test_unsupported_types_are_rejected() {
        assert!(validate_image(b"<svg></svg>", Some("image/svg+xml")).is_err());
        assert!(validate_image(b"<html></html>", Some("text/html")).is_err());
        assert!(validate_image(&[], Some("image/png")).is_err());
    }

    // ==================== Ingestion Tests ====================

    #[tokio::test]
    async fn test_ingest_uploads_with_sniffed_type() {
        let (transport, ingester) = ingester(
            MockTransport::new()
                .respond(Method::Get, IMAGE_URL, 200, None, png(64))
                .json(Method::Post, UPLOAD_BLOB, 200, json!({ "blob": { "$type": "blob", "size": 64 } })),
        );

        let blob = ingester.ingest(IMAGE_URL, &session()).await.unwrap();

        assert_eq!(blob.mime_type, "image/png");
        assert_eq!(blob.raw_bytes.len(), 64);
        assert_eq!(blob.blob_ref["size"], 64);

        let upload = transport
            .requests()
            .into_iter()
            .find(|r| r.url == UPLOAD_BLOB)
            .unwrap();
        assert!(upload
            .headers
            .contains(&("Content-Type".to_string(), "image/png".to_string())));
        assert!(upload
            .headers
            .contains(&("Authorization".to_string(), "Bearer jwt".to_string())));
        let uploaded = upload.body.unwrap();
        assert_eq!(uploaded.len(), 64);
        // Same buffer, not a copy.
        assert_eq!(uploaded.as_ptr(), blob.raw_bytes.as_ptr());
    }

    #[tokio::test]
    async fn test_oversized_image_is_not_uploaded() {
        let (transport, ingester) = ingester(
            MockTransport::new()
                .respond(Method::Get, IMAGE_URL, 200, Some("image/png"), png(MAX_IMAGE_BYTES + 1))
                .json(Method::Post, UPLOAD_BLOB, 200, json!({ "blob": {} })),
        );

        let err = ingester.try_ingest(IMAGE_URL, &session()).await.unwrap_err();

        assert!(matches!(err, AutoPostError::Validation(_)));
        assert_eq!(transport.count(Method::Post, UPLOAD_BLOB), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_yields_none() {
        let (_, ingester) = ingester(
            MockTransport::new()
                .respond(Method::Get, IMAGE_URL, 200, Some("image/png"), png(16))
                .json(Method::Post, UPLOAD_BLOB, 400, json!({ "error": "InvalidRequest" })),
        );

        assert!(ingester.ingest(IMAGE_URL, &session()).await.is_none());
    }

    #[tokio::test]
    async fn test_download_failure_yields_none() {
        let (_, ingester) = ingester(MockTransport::new().fail(Method::Get, IMAGE_URL, "timed out"));

        assert!(ingester.ingest(IMAGE_URL, &session()).await.is_none());
    }
}
