use std::fmt;

use serde::{Deserialize, Serialize};

/// A named element the engine needs to find on the channel page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorRole {
    Scroller,
    MessageItem,
    Author,
    AuthorAvatar,
    Timestamp,
    EditedTimestamp,
    Content,
    Attachment,
    ThreadLink,
}

impl LocatorRole {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorRole::Scroller => "scroller",
            LocatorRole::MessageItem => "message_item",
            LocatorRole::Author => "author",
            LocatorRole::AuthorAvatar => "author_avatar",
            LocatorRole::Timestamp => "timestamp",
            LocatorRole::EditedTimestamp => "edited_timestamp",
            LocatorRole::Content => "content",
            LocatorRole::Attachment => "attachment",
            LocatorRole::ThreadLink => "thread_link",
        }
    }
}

impl fmt::Display for LocatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Selector patterns for each role, matched against the web client's markup.
///
/// The client uses hashed class names (`username_a1b2c3`), so the defaults
/// match on class-name fragments. A markup change should only ever require
/// editing the `[locators]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locators {
    /// Scrollable container of the message pane
    pub scroller: String,
    /// One rendered message, carrying `id="chat-messages-<channel>-<message>"`
    pub message_item: String,
    /// Author name; only present on the first message of a visual group
    pub author: String,
    pub author_avatar: String,
    /// Element with a `datetime` attribute
    pub timestamp: String,
    pub edited_timestamp: String,
    pub content: String,
    pub attachment: String,
    pub thread_link: String,
}

impl Default for Locators {
    fn default() -> Self {
        Self {
            scroller: "[class*=\"scrollerInner\"]".to_string(),
            message_item: "li[id^=\"chat-messages-\"]".to_string(),
            author: "h3 [class*=\"username\"]".to_string(),
            author_avatar: "img[class*=\"avatar\"]".to_string(),
            timestamp: "time[datetime]".to_string(),
            edited_timestamp: "[class*=\"edited\"] time[datetime]".to_string(),
            content: "[id^=\"message-content-\"]".to_string(),
            attachment: "a[class*=\"originalLink\"], a[class*=\"fileNameLink\"]".to_string(),
            thread_link: "[class*=\"threadMessageAccessory\"] a[href*=\"/channels/\"]".to_string(),
        }
    }
}

impl Locators {
    pub fn selector(&self, role: LocatorRole) -> &str {
        match role {
            LocatorRole::Scroller => &self.scroller,
            LocatorRole::MessageItem => &self.message_item,
            LocatorRole::Author => &self.author,
            LocatorRole::AuthorAvatar => &self.author_avatar,
            LocatorRole::Timestamp => &self.timestamp,
            LocatorRole::EditedTimestamp => &self.edited_timestamp,
            LocatorRole::Content => &self.content,
            LocatorRole::Attachment => &self.attachment,
            LocatorRole::ThreadLink => &self.thread_link,
        }
    }
}
