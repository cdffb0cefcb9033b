//! Filesystem storage for post images.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use imagesize::{ImageError, ImageSize};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Directory, relative to the storage root, that post images are written to.
const POST_IMAGE_DIR: &str = "posts";

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("uploaded file is not a supported image")]
    NotAnImage,
    #[error("uploaded file size exceeds supported range")]
    SizeOverflow,
}

impl UploadStorageError {
    /// Whether the error describes the submitted file rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyPayload | Self::NotAnImage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub stored_path: String,
    pub size_bytes: i64,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Check that `data` decodes as an image without touching the disk.
    pub fn probe_image(data: &[u8]) -> Result<ImageSize, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }
        match imagesize::blob_size(data) {
            Ok(size) if size.width > 0 && size.height > 0 => Ok(size),
            Ok(_) | Err(ImageError::NotSupported) | Err(ImageError::CorruptedImage) => {
                Err(UploadStorageError::NotAnImage)
            }
            Err(ImageError::IoError(err)) => Err(UploadStorageError::Io(err)),
        }
    }

    /// Validate and persist an uploaded image under `posts/`.
    pub async fn store_image(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredImage, UploadStorageError> {
        let size = Self::probe_image(&data)?;
        let size_bytes =
            i64::try_from(data.len()).map_err(|_| UploadStorageError::SizeOverflow)?;

        let stored_path = self.build_stored_path(original_name);
        let absolute = self.resolve(&stored_path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        if let Err(err) = file.write_all(&data).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(err.into());
        }
        file.flush().await?;

        Ok(StoredImage {
            stored_path,
            size_bytes,
            width: size.width,
            height: size.height,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove the stored payload. Missing files are treated as success.
    pub async fn delete(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }

    fn build_stored_path(&self, original_name: &str) -> String {
        let identifier = Uuid::new_v4().simple();
        let filename = sanitize_filename(original_name);
        format!("{POST_IMAGE_DIR}/{identifier}-{filename}")
    }
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest valid GIF: 1x1 transparent pixel.
    const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21, 0xf9,
        0x04, 0x01, 0x0a, 0x00, 0x01, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
        0x00, 0x02, 0x02, 0x4c, 0x01, 0x00, 0x3b,
    ];

    #[tokio::test]
    async fn stores_images_under_posts_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        let stored = storage
            .store_image("Small Picture.GIF", Bytes::from_static(SMALL_GIF))
            .await
            .expect("stored");

        assert!(stored.stored_path.starts_with("posts/"));
        assert!(stored.stored_path.ends_with("-small-picture.gif"));
        assert_eq!((stored.width, stored.height), (1, 1));
        assert_eq!(
            storage.read(&stored.stored_path).await.expect("read"),
            Bytes::from_static(SMALL_GIF)
        );

        storage.delete(&stored.stored_path).await.expect("delete");
        storage
            .delete(&stored.stored_path)
            .await
            .expect("deleting twice is fine");
    }

    #[tokio::test]
    async fn rejects_non_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        let err = storage
            .store_image("notes.txt", Bytes::from_static(b"plain text, not pixels"))
            .await
            .expect_err("text rejected");
        assert!(matches!(err, UploadStorageError::NotAnImage));
        assert!(err.is_client_error());

        let err = storage
            .store_image("empty.png", Bytes::new())
            .await
            .expect_err("empty rejected");
        assert!(matches!(err, UploadStorageError::EmptyPayload));
    }

    #[tokio::test]
    async fn refuses_paths_outside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        for path in ["../secret", "/etc/passwd", ""] {
            assert!(matches!(
                storage.read(path).await,
                Err(UploadStorageError::InvalidPath)
            ));
        }
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_filename("Котик.JPG"), "kotik.jpg");
        assert_eq!(sanitize_filename("!!!"), "image");
    }
}
