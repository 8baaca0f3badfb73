//! Core data models used throughout AI Terminal.
//!
//! These types represent the handling modes, the records kept by the
//! context store, and the messages exchanged with the model gateway.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handling strategy for a user request.
///
/// The classifier maps every input to exactly one of these; dispatch on the
/// variant is exhaustive, so a new mode cannot be added without the
/// compiler pointing at every site that must learn about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Conversation,
    Command,
    Document,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Conversation => "conversation",
            Mode::Command => "command",
            Mode::Document => "document",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed (or in-flight) exchange in the conversation log.
///
/// Immutable once recorded. The store keeps these in insertion order and
/// evicts the oldest first when the configured cap is exceeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
}

/// One shell command observed by the environment-update hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Cached summary/analysis metadata for a previously processed document,
/// keyed in the store by canonicalized absolute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnnotation {
    pub last_accessed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

/// Environment variables and working directory carried across invocations.
///
/// `variables` is merge-updated (new keys added, existing overwritten),
/// never replaced wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentState {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub current_directory: Option<String>,
}

/// Role of a chat message sent to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in the ordered history handed to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one generation. Fixed per mode, not
/// user-tunable per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}
