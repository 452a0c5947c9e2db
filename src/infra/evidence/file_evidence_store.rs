// Filesystem evidence store.
//
// Captured attachments land under `<root>/<case_id>/<message_id>_<name>`.
// Filenames are sanitized so attachment names can't escape the root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::core::evidence::{EvidenceDescriptor, EvidenceError, EvidenceStore};

pub struct FileEvidenceStore {
    root: PathBuf,
}

impl FileEvidenceStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn sanitize(name: &str) -> String {
        let cleaned: String = name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if cleaned.is_empty() {
            "file.bin".to_string()
        } else {
            cleaned
        }
    }
}

#[async_trait]
impl EvidenceStore for FileEvidenceStore {
    async fn save(
        &self,
        case_id: u64,
        file_name: &str,
        bytes: &[u8],
        source_url: &str,
    ) -> Result<EvidenceDescriptor, EvidenceError> {
        let dir = self.root.join(case_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| EvidenceError::Storage(e.to_string()))?;

        let path = dir.join(Self::sanitize(file_name));
        fs::write(&path, bytes)
            .await
            .map_err(|e| EvidenceError::Storage(e.to_string()))?;

        Ok(EvidenceDescriptor {
            file_name: file_name.to_string(),
            stored_path: path.to_string_lossy().to_string(),
            size_bytes: bytes.len() as u64,
            source_url: source_url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_bytes_under_case_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEvidenceStore::new(dir.path());

        let descriptor = store
            .save(7, "12345_promo.png", b"not really a png", "https://cdn.example/promo.png")
            .await
            .unwrap();

        assert_eq!(descriptor.size_bytes, 16);
        let saved = std::fs::read(&descriptor.stored_path).unwrap();
        assert_eq!(saved, b"not really a png");
        assert!(descriptor.stored_path.contains("7"));
    }

    #[tokio::test]
    async fn hostile_filenames_stay_inside_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEvidenceStore::new(dir.path());

        let descriptor = store
            .save(1, "../../etc/passwd", b"x", "https://cdn.example/x")
            .await
            .unwrap();

        let path = PathBuf::from(&descriptor.stored_path);
        assert!(path.starts_with(dir.path()));
        // separators were replaced, so the file sits directly in the case dir
        assert_eq!(path.parent().unwrap(), dir.path().join("1"));
    }
}
