//! Directory-backed object storage. Objects live at `{root}/{bucket}/{name}` and are
//! served publicly under `/storage/{bucket}/{name}`.

use std::path::{Path, PathBuf};

use tracing::info;

pub const LISTING_IMAGES: &str = "listing-images";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object name {0:?}")]
    InvalidName(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    public_base: String,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base: format!("{}/storage", public_url.trim_end_matches('/')),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores `bytes` under `bucket/name`. Existing objects are not overwritten.
    pub async fn upload(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        check_name(bucket)?;
        check_name(name)?;

        let dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(name);
        if tokio::fs::try_exists(&path).await? {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "The resource already exists",
            )));
        }
        tokio::fs::write(&path, bytes).await?;

        info!(bucket, name, size = bytes.len(), "object stored");
        Ok(())
    }

    pub fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/{bucket}/{name}", self.public_base)
    }
}

fn check_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_owned()))
    }
}

/// Object name for a listing image: `{user_id}-{millis}.{ext}`, where the extension is
/// whatever follows the last dot of the uploaded file name.
pub fn image_name(user_id: uuid::Uuid, millis: i128, file_name: &str) -> String {
    let ext: String = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if ext.is_empty() {
        format!("{user_id}-{millis}")
    } else {
        format!("{user_id}-{millis}.{}", ext.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn upload_writes_object_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path(), "http://localhost:8080/");

        store.upload(LISTING_IMAGES, "a.png", b"png").await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join(LISTING_IMAGES).join("a.png")).unwrap(),
            b"png"
        );
        assert!(store.upload(LISTING_IMAGES, "a.png", b"again").await.is_err());
        assert_eq!(
            store.public_url(LISTING_IMAGES, "a.png"),
            "http://localhost:8080/storage/listing-images/a.png"
        );
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path(), "http://localhost:8080");

        let err = store.upload(LISTING_IMAGES, "../escape.png", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)));
    }

    #[test]
    fn image_name_keeps_last_extension() {
        let user = Uuid::nil();
        assert_eq!(
            image_name(user, 1700, "My Calc.final.JPG"),
            format!("{user}-1700.jpg")
        );
        assert_eq!(image_name(user, 1700, "noext"), format!("{user}-1700.noext"));
        assert_eq!(image_name(user, 1700, "weird.p/n\\g"), format!("{user}-1700.png"));
    }
}
