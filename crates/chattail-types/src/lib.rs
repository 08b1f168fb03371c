//! Shared types for chattail
//!
//! This crate contains the data structures passed between the source,
//! the processing pipeline and the binary.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Source Types
// ============================================================================

/// An entry exactly as the external client reports it, before any cleanup
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Display name of the author (player-authored entries only)
    #[serde(default)]
    pub name: Option<String>,

    /// Message body
    #[serde(default)]
    pub value: String,

    /// Channel owner for group-scoped entries
    #[serde(default)]
    pub sender: Option<String>,

    /// Explicit message type code, when the client exposes one
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl RawEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Everything the external buffer held for one category at poll time
pub type RawSnapshot = Vec<RawEntry>;

// ============================================================================
// Entry Types
// ============================================================================

/// Message category, either supplied by the source or derived from fields
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    PublicChat,
    PrivateChat,
    ClanChat,
    ClanAnnouncement,
    PlayerMessage,
    GameMessage,
    Broadcast,
    Trade,
    /// A source code with no dedicated variant, kept lowercased
    Other(String),
}

impl Category {
    /// Map an explicit message type code from the client.
    ///
    /// Returns `None` for an empty code so the caller can fall back to
    /// field-based classification.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.is_empty() {
            return None;
        }

        let category = match code.to_ascii_uppercase().as_str() {
            "PUBLICCHAT" | "MODCHAT" => Self::PublicChat,
            "PRIVATECHAT" | "PRIVATECHATOUT" | "MODPRIVATECHAT" => Self::PrivateChat,
            "GAMEMESSAGE" | "SPAM" | "ENGINE" => Self::GameMessage,
            "CLAN_CHAT" | "CLAN_GUEST_CHAT" | "FRIENDSCHAT" => Self::ClanChat,
            "CLAN_MESSAGE" | "CLAN_GUEST_MESSAGE" | "FRIENDSCHATNOTIFICATION" => {
                Self::ClanAnnouncement
            }
            "BROADCAST" => Self::Broadcast,
            "TRADE" | "TRADEREQ" => Self::Trade,
            _ => Self::Other(code.to_ascii_lowercase()),
        };
        Some(category)
    }

    /// Parse the snake_case name used in config files and output
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "public_chat" => Self::PublicChat,
            "private_chat" => Self::PrivateChat,
            "clan_chat" => Self::ClanChat,
            "clan_announcement" => Self::ClanAnnouncement,
            "player_message" => Self::PlayerMessage,
            "game_message" => Self::GameMessage,
            "broadcast" => Self::Broadcast,
            "trade" => Self::Trade,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PublicChat => "public_chat",
            Self::PrivateChat => "private_chat",
            Self::ClanChat => "clan_chat",
            Self::ClanAnnouncement => "clan_announcement",
            Self::PlayerMessage => "player_message",
            Self::GameMessage => "game_message",
            Self::Broadcast => "broadcast",
            Self::Trade => "trade",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cleaned, classified log entry
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Author display name (player-authored entries)
    pub display_name: Option<String>,

    /// Message body
    pub value: String,

    /// Channel owner (group-scoped entries)
    pub sender: Option<String>,

    /// Resolved category
    pub category: Category,
}

impl Entry {
    pub fn new(value: impl Into<String>, category: Category) -> Self {
        Self {
            display_name: None,
            value: value.into(),
            sender: None,
            category,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Whether two entries carry the same visible content.
    ///
    /// This is the identity used for alignment: `(display_name, value)`.
    pub fn same_content(&self, other: &Entry) -> bool {
        self.display_name == other.display_name && self.value == other.value
    }

    /// Render as a chat log line (`name: value`, or just the value)
    pub fn line(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{}: {}", name, self.value),
            None => self.value.clone(),
        }
    }
}

/// Ordered, cleaned contents of one buffer at poll time
pub type Snapshot = Vec<Entry>;
