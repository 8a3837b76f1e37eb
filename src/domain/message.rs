use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: Option<String>,
}

impl Attachment {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let filename = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        Self { url, filename }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub channel_id: String,
    pub message_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited_timestamp: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
    pub thread_id: Option<String>,
}

impl Message {
    pub fn new(
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
            author_id: String::new(),
            author_name: String::new(),
            content: String::new(),
            timestamp,
            edited_timestamp: None,
            attachments: Vec::new(),
            thread_id: None,
        }
    }

    /// Fingerprint of the mutable parts of a message.
    ///
    /// Two extractions of the same message hash equal unless anything the
    /// archive stores for it changed, including a refined send time.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.timestamp.timestamp_millis().to_be_bytes());
        hasher.update(self.author_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.author_name.as_bytes());
        hasher.update([0]);
        hasher.update(self.content.as_bytes());
        hasher.update([0]);
        if let Some(edited) = self.edited_timestamp {
            hasher.update(edited.timestamp_millis().to_be_bytes());
        }
        hasher.update([0]);
        for attachment in &self.attachments {
            hasher.update(attachment.url.as_bytes());
            hasher.update([0]);
        }
        if let Some(ref thread_id) = self.thread_id {
            hasher.update(thread_id.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn is_edited(&self) -> bool {
        self.edited_timestamp.is_some()
    }
}

/// Summary row for a thread started from a channel's messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub channel_id: String,
    pub message_count: i64,
    pub last_activity: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Message {
        let mut msg = Message::new("c1", "m1", Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        msg.author_id = "u1".into();
        msg.author_name = "alice".into();
        msg.content = "hello".into();
        msg
    }

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(sample().content_hash(), sample().content_hash());
    }

    #[test]
    fn test_content_hash_changes_on_edit() {
        let original = sample();
        let mut edited = sample();
        edited.content = "hello (edited)".into();
        edited.edited_timestamp = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap());
        assert_ne!(original.content_hash(), edited.content_hash());
        assert!(edited.is_edited());
    }

    #[test]
    fn test_content_hash_covers_timestamp() {
        let mut refined = sample();
        refined.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 42).unwrap();
        assert_ne!(sample().content_hash(), refined.content_hash());
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = sample().content_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_separates_fields() {
        let mut a = sample();
        a.author_name = "ab".into();
        a.content = "c".into();
        let mut b = sample();
        b.author_name = "a".into();
        b.content = "bc".into();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_attachment_filename_from_url() {
        let att = Attachment::new("https://cdn.example.com/attachments/1/2/photo.png?ex=abc");
        assert_eq!(att.filename.as_deref(), Some("photo.png"));

        let bare = Attachment::new("https://cdn.example.com/");
        assert_eq!(bare.filename, None);
    }
}
