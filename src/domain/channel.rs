use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Text,
    Announcement,
    Forum,
    Thread,
    Voice,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Text => "text",
            ChannelKind::Announcement => "announcement",
            ChannelKind::Forum => "forum",
            ChannelKind::Thread => "thread",
            ChannelKind::Voice => "voice",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(ChannelKind::Text),
            "announcement" | "news" => Ok(ChannelKind::Announcement),
            "forum" => Ok(ChannelKind::Forum),
            "thread" => Ok(ChannelKind::Thread),
            "voice" => Ok(ChannelKind::Voice),
            other => Err(format!("Unknown channel kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub server_id: String,
    pub name: String,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn new(
        id: impl Into<String>,
        server_id: impl Into<String>,
        name: impl Into<String>,
        kind: ChannelKind,
    ) -> Self {
        Self {
            id: id.into(),
            server_id: server_id.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn display_name(&self) -> String {
        format!("#{}", self.name)
    }
}
