//! The image served by the pixel route.

use axum::body::Bytes;
use service_core::error::AppError;
use std::path::Path;

/// Smallest valid transparent 1x1 GIF.
const TRANSPARENT_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Debug, Clone)]
pub struct PixelAsset {
    bytes: Bytes,
    content_type: String,
}

impl PixelAsset {
    /// Reads the image once; the content type follows the file extension.
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read image {}: {}",
                path.display(),
                e
            ))
        })?;

        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        tracing::info!(
            path = %path.display(),
            content_type = %content_type,
            size = bytes.len(),
            "Loaded pixel image"
        );

        Ok(Self {
            bytes: Bytes::from(bytes),
            content_type,
        })
    }

    pub fn transparent_gif() -> Self {
        Self {
            bytes: Bytes::from_static(TRANSPARENT_GIF),
            content_type: "image/gif".to_string(),
        }
    }

    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn content_type_follows_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qr.jpeg");
        tokio::fs::write(&path, b"\xff\xd8\xff\xe0fake").await.unwrap();

        let asset = PixelAsset::load(&path).await.unwrap();

        assert_eq!(asset.content_type(), "image/jpeg");
        assert_eq!(&asset.bytes()[..], b"\xff\xd8\xff\xe0fake");
    }

    #[tokio::test]
    async fn missing_image_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PixelAsset::load(&dir.path().join("missing.png")).await;
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn builtin_pixel_is_a_gif() {
        let asset = PixelAsset::transparent_gif();
        assert_eq!(asset.content_type(), "image/gif");
        assert!(asset.bytes().starts_with(b"GIF89a"));
    }
}
