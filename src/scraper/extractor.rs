use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::{Attachment, Cursor, Message};

/// One rendered message element, as reported by the snapshot script.
///
/// Fields the client did not render are `None`/empty. In particular the
/// author header is only present on the first message of a visual group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMessage {
    pub element_id: String,
    pub author_name: Option<String>,
    pub avatar_url: Option<String>,
    pub timestamp: Option<String>,
    pub edited_timestamp: Option<String>,
    pub content: String,
    pub attachments: Vec<String>,
    pub thread_href: Option<String>,
}

/// Rendered message elements in DOM order (oldest at the top).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(pub Vec<RawMessage>);

impl Snapshot {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Messages extracted from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedBatch {
    /// Newest first, as the viewport reads bottom-up
    pub messages: Vec<Message>,
    /// Entries that could not be attributed or parsed
    pub skipped: usize,
}

impl ExtractedBatch {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Oldest message in the batch, as a job cursor.
    pub fn oldest(&self) -> Option<Cursor> {
        self.messages
            .iter()
            .min_by_key(|m| m.timestamp)
            .map(|m| Cursor::new(m.message_id.clone(), m.timestamp))
    }
}

/// Author header carried across a visual group.
struct GroupHeader {
    author_id: String,
    author_name: String,
    timestamp: Option<DateTime<Utc>>,
}

/// Turns page snapshots into message records for one channel.
///
/// Extraction never touches the page; overlapping batches are expected and
/// resolved by the store's upsert.
pub struct MessageExtractor {
    channel_id: String,
}

impl MessageExtractor {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
        }
    }

    pub fn extract(&self, snapshot: &Snapshot) -> ExtractedBatch {
        let mut batch = ExtractedBatch::default();
        let mut group: Option<GroupHeader> = None;

        for raw in &snapshot.0 {
            let author_name = raw
                .author_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty());

            if let Some(name) = author_name {
                group = Some(GroupHeader {
                    author_id: raw
                        .avatar_url
                        .as_deref()
                        .and_then(author_id_from_avatar)
                        .unwrap_or_else(|| name.to_string()),
                    author_name: name.to_string(),
                    timestamp: None,
                });
            }

            // A continuation whose header scrolled out of view
            let Some(header) = group.as_mut() else {
                trace!(element_id = %raw.element_id, "Skipping entry without group header");
                batch.skipped += 1;
                continue;
            };

            let Some(message_id) = message_id_from_element(&raw.element_id) else {
                trace!(element_id = %raw.element_id, "Skipping entry without message id");
                batch.skipped += 1;
                continue;
            };

            let timestamp = match raw.timestamp.as_deref().and_then(parse_timestamp) {
                Some(ts) => ts,
                None => match header.timestamp {
                    Some(ts) => ts,
                    None => {
                        trace!(element_id = %raw.element_id, "Skipping entry without timestamp");
                        batch.skipped += 1;
                        continue;
                    }
                },
            };
            header.timestamp = Some(timestamp);

            let mut message = Message::new(self.channel_id.clone(), message_id, timestamp);
            message.author_id = header.author_id.clone();
            message.author_name = header.author_name.clone();
            message.content = raw.content.trim().to_string();
            message.edited_timestamp = raw.edited_timestamp.as_deref().and_then(parse_timestamp);
            message.attachments = raw
                .attachments
                .iter()
                .filter(|url| !url.is_empty())
                .map(Attachment::new)
                .collect();
            message.thread_id = raw.thread_href.as_deref().and_then(last_path_segment);

            batch.messages.push(message);
        }

        batch.messages.reverse();
        batch
    }
}

/// `chat-messages-<channel>-<message>` → `<message>`
fn message_id_from_element(element_id: &str) -> Option<String> {
    element_id
        .rsplit('-')
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// `https://cdn.example.com/avatars/<user>/<hash>.webp` → `<user>`
fn author_id_from_avatar(avatar_url: &str) -> Option<String> {
    let mut segments = avatar_url.split(['?', '#']).next()?.split('/');
    segments.find(|s| *s == "avatars")?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn last_path_segment(href: &str) -> Option<String> {
    href.split(['?', '#'])
        .next()?
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
