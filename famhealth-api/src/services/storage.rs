/// Local file storage for uploaded documents
///
/// Files land under `{upload_dir}/documents/{user_id}/{uuid}{ext}` and are
/// served back at `/uploads/...` by a static file service. Public URLs are
/// mapped back to disk paths only if they stay inside the upload root.

use famhealth_shared::models::document::DocumentFile;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;

/// URL prefix under which the upload root is served
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Files accepted by `upload-multiple` in one request
pub const MAX_FILES_PER_UPLOAD: usize = 10;

pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "application/pdf"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("invalid file path")]
    InvalidPath,
    #[error("no file provided")]
    MissingFile,
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

fn extension_for(mime_type: &str, original_name: &str) -> String {
    let from_name = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()));

    from_name.unwrap_or_else(|| {
        match mime_type {
            "image/jpeg" => ".jpg",
            "image/png" => ".png",
            "image/gif" => ".gif",
            "application/pdf" => ".pdf",
            _ => "",
        }
        .to_string()
    })
}

/// Upload directory manager
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    max_bytes: usize,
}

impl FileStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.upload_dir.clone(),
            max_bytes: config.max_upload_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Checks type and size before anything touches the disk
    pub fn validate(&self, mime_type: &str, size: usize) -> Result<(), StorageError> {
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(StorageError::UnsupportedType(mime_type.to_string()));
        }
        if size == 0 {
            return Err(StorageError::MissingFile);
        }
        if size > self.max_bytes {
            return Err(StorageError::TooLarge { limit: self.max_bytes });
        }
        Ok(())
    }

    /// Writes one upload and describes it for the client
    pub async fn save(
        &self,
        user_id: Uuid,
        original_name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<DocumentFile, StorageError> {
        self.validate(mime_type, data.len())?;

        let dir = self.root.join("documents").join(user_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!("{}{}", Uuid::new_v4(), extension_for(mime_type, original_name));
        tokio::fs::write(dir.join(&file_name), data).await?;

        tracing::info!(%user_id, file = %file_name, size = data.len(), "stored upload");

        Ok(DocumentFile {
            url: format!("{}/documents/{}/{}", PUBLIC_PREFIX, user_id, file_name),
            name: file_name,
            original_name: original_name.to_string(),
            size: Some(data.len() as i64),
            mime_type: Some(mime_type.to_string()),
        })
    }

    /// Maps a public `/uploads/...` URL to its path inside the root
    pub fn resolve(&self, url: &str) -> Result<PathBuf, StorageError> {
        let relative = url
            .strip_prefix(PUBLIC_PREFIX)
            .unwrap_or(url)
            .trim_start_matches('/');

        let relative = Path::new(relative);
        if relative.as_os_str().is_empty()
            || relative.components().any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }

    /// Removes a stored file; a file that is already gone is not an error
    pub async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let path = self.resolve(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "file already removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &Path) -> FileStorage {
        FileStorage::new(&StorageConfig {
            upload_dir: root.to_path_buf(),
            max_upload_bytes: 16,
        })
    }

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("famhealth-storage-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_validate() {
        let s = storage(Path::new("/tmp"));
        assert!(s.validate("image/png", 10).is_ok());
        assert!(matches!(s.validate("text/html", 10), Err(StorageError::UnsupportedType(_))));
        assert!(matches!(s.validate("image/png", 17), Err(StorageError::TooLarge { limit: 16 })));
        assert!(matches!(s.validate("image/png", 0), Err(StorageError::MissingFile)));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension_for("image/png", "Scan.PNG"), ".png");
        assert_eq!(extension_for("image/jpeg", "photo"), ".jpg");
        assert_eq!(extension_for("application/pdf", "weird.p$f"), ".pdf");
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let s = storage(Path::new("/srv/uploads"));
        assert_eq!(
            s.resolve("/uploads/documents/u/a.png").unwrap(),
            PathBuf::from("/srv/uploads/documents/u/a.png")
        );
        assert!(matches!(s.resolve("/uploads/../etc/passwd"), Err(StorageError::InvalidPath)));
        assert!(matches!(s.resolve("/uploads/"), Err(StorageError::InvalidPath)));
    }

    #[tokio::test]
    async fn test_save_and_delete() {
        let root = temp_root();
        let s = storage(&root);
        let user = Uuid::new_v4();

        let file = s.save(user, "report.png", "image/png", b"png-bytes").await.unwrap();
        assert!(file.url.starts_with(&format!("/uploads/documents/{}/", user)));
        assert!(file.name.ends_with(".png"));
        assert_eq!(file.size, Some(9));

        let path = s.resolve(&file.url).unwrap();
        assert!(path.exists());

        s.delete(&file.url).await.unwrap();
        assert!(!path.exists());
        // second delete is a no-op
        s.delete(&file.url).await.unwrap();

        let _ = std::fs::remove_dir_all(root);
    }
}
