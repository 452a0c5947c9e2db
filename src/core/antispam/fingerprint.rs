// Content fingerprinting for duplicate detection.
//
// A fingerprint is a deterministic digest of everything "salient" about a
// message: normalized text plus attachment, embed and sticker metadata.
// Two messages fingerprint equal iff all of those match; collisions are
// acceptable but rare (64-bit SipHash with fixed keys).

use super::antispam_models::MessageSnapshot;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Embed descriptions are truncated before hashing to bound the canonical form.
const EMBED_DESCRIPTION_LEN: usize = 100;

/// Compute the fingerprint of a message snapshot.
///
/// Each component is tagged by kind before concatenation, so an attachment
/// named "x" can never collide with a sticker id "x".
pub fn fingerprint(snapshot: &MessageSnapshot) -> u64 {
    let mut canonical = String::new();

    canonical.push_str(&snapshot.text.trim().to_lowercase());

    for a in &snapshot.attachments {
        canonical.push_str(&format!(
            "|att:{}:{}:{}",
            a.filename,
            a.size_bytes,
            a.content_type.as_deref().unwrap_or("")
        ));
    }

    for e in &snapshot.embeds {
        let description: String = e
            .description
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(EMBED_DESCRIPTION_LEN)
            .collect();
        canonical.push_str(&format!(
            "|emb:{}:{}:{}",
            e.url.as_deref().unwrap_or(""),
            e.title.as_deref().unwrap_or(""),
            description
        ));
    }

    for id in &snapshot.sticker_ids {
        canonical.push_str(&format!("|stk:{}", id));
    }

    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antispam::antispam_models::{AttachmentMeta, EmbedMeta};

    fn attachment(name: &str, size: u64) -> AttachmentMeta {
        AttachmentMeta {
            filename: name.to_string(),
            size_bytes: size,
            content_type: Some("image/png".to_string()),
            url: format!("https://cdn.example/{}", name),
        }
    }

    #[test]
    fn identical_messages_fingerprint_equal() {
        let a = MessageSnapshot {
            text: "Join my server!".to_string(),
            attachments: vec![attachment("promo.png", 1024)],
            embeds: vec![EmbedMeta {
                url: Some("https://spam.example".to_string()),
                title: Some("Free stuff".to_string()),
                description: Some("really free".to_string()),
            }],
            sticker_ids: vec![42],
        };
        let b = a.clone();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn text_normalization_ignores_case_and_whitespace() {
        let a = MessageSnapshot {
            text: "  Join My Server!  ".to_string(),
            ..Default::default()
        };
        let b = MessageSnapshot {
            text: "join my server!".to_string(),
            ..Default::default()
        };
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn any_field_change_alters_fingerprint() {
        let base = MessageSnapshot {
            text: "hello".to_string(),
            attachments: vec![attachment("a.png", 10)],
            sticker_ids: vec![7],
            ..Default::default()
        };

        let mut different_text = base.clone();
        different_text.text = "hullo".to_string();
        assert_ne!(fingerprint(&base), fingerprint(&different_text));

        let mut different_size = base.clone();
        different_size.attachments[0].size_bytes = 11;
        assert_ne!(fingerprint(&base), fingerprint(&different_size));

        let mut different_sticker = base.clone();
        different_sticker.sticker_ids = vec![8];
        assert_ne!(fingerprint(&base), fingerprint(&different_sticker));
    }

    #[test]
    fn kind_tags_prevent_cross_component_collisions() {
        let with_attachment = MessageSnapshot {
            attachments: vec![attachment("42", 0)],
            ..Default::default()
        };
        let with_sticker = MessageSnapshot {
            sticker_ids: vec![42],
            ..Default::default()
        };
        assert_ne!(fingerprint(&with_attachment), fingerprint(&with_sticker));
    }
}
