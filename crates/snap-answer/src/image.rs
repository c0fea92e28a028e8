//! Image loading - file bytes to a base64 payload

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quorum::ImagePayload;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read image {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("image {} is empty", .0.display())]
    Empty(PathBuf),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
}

pub type ImageResult<T> = Result<T, ImageError>;

/// MIME type from the file extension
pub fn media_type_for(path: &Path) -> ImageResult<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "webp" => Ok("image/webp"),
        "gif" => Ok("image/gif"),
        other => Err(ImageError::UnsupportedFormat(if other.is_empty() {
            path.display().to_string()
        } else {
            other.to_string()
        })),
    }
}

/// Encode raw image bytes
pub fn encode(bytes: &[u8], media_type: &str) -> ImagePayload {
    ImagePayload::new(STANDARD.encode(bytes), media_type)
}

/// Read and encode an image file
pub async fn load_image(path: &Path) -> ImageResult<ImagePayload> {
    let media_type = media_type_for(path)?;
    let bytes = tokio::fs::read(path).await.map_err(|source| ImageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(ImageError::Empty(path.to_path_buf()));
    }
    Ok(encode(&bytes, media_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_by_extension() {
        assert_eq!(media_type_for(Path::new("q.JPG")).unwrap(), "image/jpeg");
        assert_eq!(media_type_for(Path::new("a/b.png")).unwrap(), "image/png");
        assert!(matches!(
            media_type_for(Path::new("notes.txt")),
            Err(ImageError::UnsupportedFormat(ext)) if ext == "txt"
        ));
        assert!(media_type_for(Path::new("noext")).is_err());
    }

    #[test]
    fn test_encode() {
        let payload = encode(b"hello", "image/png");
        assert_eq!(payload.data(), "aGVsbG8=");
        assert_eq!(payload.data_url(), "data:image/png;base64,aGVsbG8=");
    }

    #[tokio::test]
    async fn test_load_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpeg");
        std::fs::write(&path, [0xff, 0xd8, 0xff]).unwrap();

        let payload = load_image(&path).await.unwrap();
        assert_eq!(payload.media_type(), "image/jpeg");
        assert_eq!(payload.data(), "/9j/");

        let empty = dir.path().join("empty.jpg");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            load_image(&empty).await,
            Err(ImageError::Empty(_))
        ));

        assert!(matches!(
            load_image(&dir.path().join("missing.png")).await,
            Err(ImageError::Read { .. })
        ));
    }
}
