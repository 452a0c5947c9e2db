// Evidence capture - the port for persisting attachments before their
// messages are deleted, plus the pure size-cap planning the orchestrator
// runs against it.

use crate::core::antispam::antispam_models::AttachmentMeta;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("evidence storage error: {0}")]
    Storage(String),
}

/// A saved evidence file, as referenced from review posts and cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceDescriptor {
    pub file_name: String,
    pub stored_path: String,
    pub size_bytes: u64,
    pub source_url: String,
}

/// An attachment we decided not to capture, with the reason noted on the
/// review post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file_name: String,
    pub size_bytes: u64,
    pub reason: String,
}

/// Storage boundary for captured attachment bytes. Size limits are the
/// caller's job; the store saves whatever it is handed.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn save(
        &self,
        case_id: u64,
        file_name: &str,
        bytes: &[u8],
        source_url: &str,
    ) -> Result<EvidenceDescriptor, EvidenceError>;
}

/// Which attachments to download and which to skip.
#[derive(Debug, Clone, Default)]
pub struct CapturePlan {
    pub download: Vec<AttachmentMeta>,
    pub skipped: Vec<SkippedFile>,
}

/// Split attachments by the per-file size cap. Oversized files are never
/// downloaded; they show up as skipped notes instead.
pub fn plan_capture(attachments: &[AttachmentMeta], max_bytes: u64) -> CapturePlan {
    let mut plan = CapturePlan::default();
    for attachment in attachments {
        if attachment.size_bytes > max_bytes {
            plan.skipped.push(SkippedFile {
                file_name: attachment.filename.clone(),
                size_bytes: attachment.size_bytes,
                reason: format!(
                    "exceeds the {} MiB evidence cap",
                    max_bytes / (1024 * 1024)
                ),
            });
        } else {
            plan.download.push(attachment.clone());
        }
    }
    plan
}
