//! Persisted conversation and environment context.
//!
//! [`ContextStore`] owns everything AI Terminal remembers across
//! invocations: the bounded conversation log, the shell command log, the
//! per-file document annotations, and the merged environment state. It is
//! loaded once at process start, mutated while handling the request, and
//! saved once at the end — an explicitly owned value passed by reference
//! through the call chain, never a global.
//!
//! On disk the store is a single JSON document (`context.json`). Saves go
//! through a temp-file rename so a reader never observes a partial write;
//! a corrupt or unreadable file loads as an empty store rather than
//! aborting the request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::{
    CommandLogEntry, ConversationEntry, DocumentAnnotation, EnvironmentState, Mode,
};

/// Fixed cap on the shell command log, independent of `max_history`.
const COMMAND_LOG_CAP: usize = 20;

/// Name of the persisted state file inside the state directory.
const STATE_FILE: &str = "context.json";

/// The on-disk shape: five top-level keys, all optional on load so older
/// or partial files still deserialize.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    conversation_history: Vec<ConversationEntry>,
    #[serde(default)]
    environment_state: BTreeMap<String, String>,
    #[serde(default)]
    current_directory: Option<String>,
    #[serde(default)]
    recent_commands: Vec<CommandLogEntry>,
    #[serde(default)]
    document_context: BTreeMap<String, DocumentAnnotation>,
}

/// Observed command-usage patterns derived from the command log.
#[derive(Debug, Clone, Serialize)]
pub struct CommandPatterns {
    /// Top 3 most frequently invoked programs with their counts.
    pub frequent_commands: Vec<(String, usize)>,
    pub complexity: Complexity,
    /// Up to 5 most frequently invoked programs.
    pub preferred_tools: Vec<String>,
}

/// Coarse label for how involved the user's shell commands tend to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }
}

pub struct ContextStore {
    conversation_history: Vec<ConversationEntry>,
    environment: EnvironmentState,
    recent_commands: Vec<CommandLogEntry>,
    document_context: BTreeMap<String, DocumentAnnotation>,
    max_history: usize,
    state_file: PathBuf,
}

impl ContextStore {
    /// Load the store from `state_dir`, creating the directory if needed.
    ///
    /// A missing state file yields an empty store; so does a corrupt one,
    /// with a warning, because losing remembered context must never block
    /// the current request.
    pub fn load(state_dir: &Path, max_history: usize) -> Result<Self> {
        std::fs::create_dir_all(state_dir).with_context(|| {
            format!("Failed to create state directory: {}", state_dir.display())
        })?;

        let state_file = state_dir.join(STATE_FILE);
        let persisted = match std::fs::read_to_string(&state_file) {
            Ok(content) => match serde_json::from_str::<PersistedState>(&content) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        "Discarding corrupt context file {}: {}",
                        state_file.display(),
                        e
                    );
                    PersistedState::default()
                }
            },
            Err(_) => PersistedState::default(),
        };

        let mut store = Self {
            conversation_history: persisted.conversation_history,
            environment: EnvironmentState {
                variables: persisted.environment_state,
                current_directory: persisted.current_directory,
            },
            recent_commands: persisted.recent_commands,
            document_context: persisted.document_context,
            max_history,
            state_file,
        };

        // A cap lowered since the last save applies immediately.
        store.trim_conversation();
        store.trim_commands();

        Ok(store)
    }

    /// Persist the full store as one self-consistent JSON snapshot.
    ///
    /// Writes to a sibling temp file and renames it into place, so a
    /// concurrent load sees either the old or the new snapshot, never a
    /// partial one.
    pub fn save(&self) -> Result<()> {
        let persisted = PersistedState {
            conversation_history: self.conversation_history.clone(),
            environment_state: self.environment.variables.clone(),
            current_directory: self.environment.current_directory.clone(),
            recent_commands: self.recent_commands.clone(),
            document_context: self.document_context.clone(),
        };

        let json = serde_json::to_string_pretty(&persisted)?;
        let tmp = self.state_file.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.state_file)
            .with_context(|| format!("Failed to replace {}", self.state_file.display()))?;

        tracing::debug!("Saved context to {}", self.state_file.display());
        Ok(())
    }

    /// Record one completed exchange, evicting the oldest entries beyond
    /// the configured cap.
    pub fn record_exchange(&mut self, user_input: &str, response: Option<&str>, mode: Mode) {
        self.conversation_history.push(ConversationEntry {
            user: user_input.to_string(),
            assistant: response.map(|r| r.to_string()),
            mode,
            timestamp: Utc::now(),
        });
        self.trim_conversation();
    }

    /// Merge environment facts into the store. Variables are upserted
    /// key-by-key; a supplied command is appended to the capped command
    /// log, stamped with the store's current directory.
    pub fn update_environment(
        &mut self,
        env_vars: Option<BTreeMap<String, String>>,
        cwd: Option<String>,
        command: Option<&str>,
    ) {
        if let Some(vars) = env_vars {
            self.environment.variables.extend(vars);
        }

        if let Some(cwd) = cwd {
            self.environment.current_directory = Some(cwd);
        }

        if let Some(command) = command {
            self.recent_commands.push(CommandLogEntry {
                command: command.to_string(),
                cwd: self.environment.current_directory.clone(),
                timestamp: Utc::now(),
            });
            self.trim_commands();
        }
    }

    /// Upsert the annotation for a canonicalized absolute path. The whole
    /// record is replaced: fields the caller does not re-supply are gone.
    pub fn annotate_document(
        &mut self,
        path: &str,
        summary: Option<String>,
        analysis: Option<String>,
    ) {
        self.document_context.insert(
            path.to_string(),
            DocumentAnnotation {
                last_accessed: Utc::now(),
                summary,
                analysis,
            },
        );
    }

    /// Select history relevant to `mode`.
    ///
    /// Entries whose mode matches are preferred. When fewer than half of
    /// `max_entries` match — the mode is new or rarely used — entries from
    /// other modes are merged in, sorted by timestamp, so one conversational
    /// aside does not erase command-mode continuity.
    pub fn relevant_history(&self, mode: Mode, max_entries: usize) -> Vec<&ConversationEntry> {
        let relevant: Vec<&ConversationEntry> = self
            .conversation_history
            .iter()
            .filter(|e| e.mode == mode)
            .collect();

        if relevant.len() < max_entries / 2 {
            let mut all: Vec<&ConversationEntry> = self.conversation_history.iter().collect();
            all.sort_by_key(|e| e.timestamp);
            let skip = all.len().saturating_sub(max_entries);
            return all.into_iter().skip(skip).collect();
        }

        let skip = relevant.len().saturating_sub(max_entries);
        relevant.into_iter().skip(skip).collect()
    }

    /// Derive command-usage patterns from the command log. `None` when no
    /// commands have been observed yet.
    pub fn command_patterns(&self) -> Option<CommandPatterns> {
        if self.recent_commands.is_empty() {
            return None;
        }

        let commands: Vec<&str> = self
            .recent_commands
            .iter()
            .map(|c| c.command.as_str())
            .collect();

        let leading = count_leading_tokens(&commands);

        Some(CommandPatterns {
            frequent_commands: leading
                .iter()
                .take(3)
                .map(|(tool, count)| (tool.to_string(), *count))
                .collect(),
            complexity: estimate_complexity(&commands),
            preferred_tools: leading
                .iter()
                .take(5)
                .map(|(tool, _)| tool.to_string())
                .collect(),
        })
    }

    /// The `count` most recently accessed document annotations, newest
    /// first.
    pub fn recent_documents(&self, count: usize) -> Vec<(&str, &DocumentAnnotation)> {
        let mut docs: Vec<(&str, &DocumentAnnotation)> = self
            .document_context
            .iter()
            .map(|(path, ann)| (path.as_str(), ann))
            .collect();
        docs.sort_by(|a, b| b.1.last_accessed.cmp(&a.1.last_accessed));
        docs.truncate(count);
        docs
    }

    pub fn conversation(&self) -> &[ConversationEntry] {
        &self.conversation_history
    }

    pub fn commands(&self) -> &[CommandLogEntry] {
        &self.recent_commands
    }

    pub fn documents(&self) -> &BTreeMap<String, DocumentAnnotation> {
        &self.document_context
    }

    pub fn environment(&self) -> &EnvironmentState {
        &self.environment
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    fn trim_conversation(&mut self) {
        if self.conversation_history.len() > self.max_history {
            let excess = self.conversation_history.len() - self.max_history;
            self.conversation_history.drain(..excess);
        }
    }

    fn trim_commands(&mut self) {
        if self.recent_commands.len() > COMMAND_LOG_CAP {
            let excess = self.recent_commands.len() - COMMAND_LOG_CAP;
            self.recent_commands.drain(..excess);
        }
    }
}

/// Count leading tokens (the invoked program names) across commands,
/// ordered by frequency descending with first-seen order breaking ties.
fn count_leading_tokens(commands: &[&str]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for cmd in commands {
        let Some(tool) = cmd.split_whitespace().next() else {
            continue;
        };
        match counts.iter_mut().find(|(t, _)| t == tool) {
            Some((_, n)) => *n += 1,
            None => counts.push((tool.to_string(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Classify command complexity from average token count and pipe usage:
/// `complex` when the average exceeds 5 tokens or more than a third of
/// commands are piped, `simple` when the average is at most 3 with no
/// pipes, `moderate` otherwise.
pub fn estimate_complexity(commands: &[&str]) -> Complexity {
    if commands.is_empty() {
        return Complexity::Simple;
    }

    let total_tokens: usize = commands
        .iter()
        .map(|c| c.split_whitespace().count())
        .sum();
    let avg_tokens = total_tokens as f64 / commands.len() as f64;
    let pipe_count = commands.iter().filter(|c| c.contains('|')).count();

    if avg_tokens > 5.0 || pipe_count as f64 > commands.len() as f64 / 3.0 {
        Complexity::Complex
    } else if avg_tokens > 3.0 || pipe_count > 0 {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}
