//! Per-request context assembly.
//!
//! Builds the ephemeral [`ContextSnapshot`] a handler needs: the fixed
//! system instructions for the chosen mode, a mode-filtered slice of
//! conversation history, environment facts, and mode-specific derived
//! signals (command-usage patterns, recently touched documents). This is a
//! pure in-memory transform over the store — no I/O of any kind happens
//! here.

use crate::models::{ChatMessage, CommandLogEntry, DocumentAnnotation, GenerationParams, Mode};
use crate::store::{CommandPatterns, ContextStore};

/// How many conversation entries at most feed a prompt.
const MAX_HISTORY_ENTRIES: usize = 10;

/// How many recent shell commands are always included.
const RECENT_COMMAND_COUNT: usize = 5;

/// How many recently accessed documents document mode surfaces.
const RECENT_DOCUMENT_COUNT: usize = 3;

/// Fixed instructions and sampling parameters for one mode. Static data,
/// never derived from user input.
pub struct ModeProfile {
    pub system_prompt: &'static str,
    pub params: GenerationParams,
}

pub fn mode_profile(mode: Mode) -> ModeProfile {
    match mode {
        Mode::Conversation => ModeProfile {
            system_prompt: "You are AI Terminal, an intelligent assistant focused on helping in a \
                 command-line environment. Provide concise, accurate, technically sound answers. \
                 Adapt to the user's skill level without oversimplifying or overcomplicating. \
                 When multiple interpretations exist, lead with the most likely one and mention \
                 the alternatives. Keep answers short unless the user explicitly asks for detail. \
                 Avoid filler, pleasantries, and restating the question.",
            params: GenerationParams {
                temperature: 0.7,
                max_tokens: 1024,
                top_p: 0.9,
            },
        },
        Mode::Command => ModeProfile {
            system_prompt: "You are AI Terminal's command expert, focused on shell assistance. \
                 Generate precise shell commands from user intent, explain what commands and \
                 their flags do, point out potential mistakes or inefficiencies, and suggest \
                 safer or faster alternatives. Use the user's environment context (working \
                 directory, shell, recent commands) when relevant. Prefer built-ins and common \
                 tools. Include a warning with any command that changes system state, explain \
                 complex commands step by step, and add troubleshooting hints where a command \
                 is likely to fail.",
            params: GenerationParams {
                temperature: 0.4,
                max_tokens: 512,
                top_p: 0.8,
            },
        },
        Mode::Document => ModeProfile {
            system_prompt: "You are AI Terminal's document analysis component, focused on \
                 processing file contents. Analyze and summarize documents according to the \
                 user's request, extract key information, and format output for readability. \
                 Apply type-specific expertise for code, configuration, and log files. \
                 Prioritize what the user explicitly asked about, distinguish factual content \
                 from inference, and stay objective unless asked for an opinion.",
            params: GenerationParams {
                temperature: 0.3,
                max_tokens: 2048,
                top_p: 0.85,
            },
        },
    }
}

/// Ephemeral, per-request bundle handed to a handler. Never persisted;
/// it only influences the store through the exchange it produces.
pub struct ContextSnapshot {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub cwd: Option<String>,
    pub recent_commands: Vec<CommandLogEntry>,
    pub command_patterns: Option<CommandPatterns>,
    pub recent_documents: Vec<(String, DocumentAnnotation)>,
    /// Live facts a handler adds per call (environment enrichment).
    pub environment_facts: Vec<(String, String)>,
}

impl ContextSnapshot {
    /// The system prompt with a rendered context preamble appended, so the
    /// assembled facts actually reach the model.
    pub fn system_prompt_with_context(&self) -> String {
        let preamble = self.context_preamble();
        if preamble.is_empty() {
            return self.system_prompt.clone();
        }
        format!("{}\n\n{}", self.system_prompt, preamble)
    }

    /// Render environment facts, recent commands, usage patterns, and
    /// recent documents as a compact text block.
    fn context_preamble(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        if let Some(cwd) = &self.cwd {
            lines.push(format!("Working directory: {}", cwd));
        }

        for (key, value) in &self.environment_facts {
            lines.push(format!("{}: {}", key, value));
        }

        if !self.recent_commands.is_empty() {
            lines.push("Recent shell commands:".to_string());
            for entry in &self.recent_commands {
                match &entry.cwd {
                    Some(cwd) => lines.push(format!("  {} (in {})", entry.command, cwd)),
                    None => lines.push(format!("  {}", entry.command)),
                }
            }
        }

        if let Some(patterns) = &self.command_patterns {
            let tools: Vec<&str> = patterns
                .preferred_tools
                .iter()
                .map(|t| t.as_str())
                .collect();
            lines.push(format!(
                "Command usage: {} complexity; preferred tools: {}",
                patterns.complexity.as_str(),
                tools.join(", ")
            ));
        }

        if !self.recent_documents.is_empty() {
            lines.push("Recently analyzed documents:".to_string());
            for (path, annotation) in &self.recent_documents {
                match annotation.summary.as_deref().or(annotation.analysis.as_deref()) {
                    Some(note) => lines.push(format!("  {}: {}", path, truncate(note, 120))),
                    None => lines.push(format!("  {}", path)),
                }
            }
        }

        if lines.is_empty() {
            String::new()
        } else {
            format!("Context:\n{}", lines.join("\n"))
        }
    }
}

/// Assemble the snapshot for `mode` from the store's current state.
pub fn assemble(mode: Mode, store: &ContextStore) -> ContextSnapshot {
    let profile = mode_profile(mode);

    let history = store
        .relevant_history(mode, MAX_HISTORY_ENTRIES)
        .into_iter()
        .flat_map(|entry| {
            let mut messages = vec![ChatMessage::user(entry.user.clone())];
            if let Some(response) = &entry.assistant {
                messages.push(ChatMessage::assistant(response.clone()));
            }
            messages
        })
        .collect();

    let commands = store.commands();
    let skip = commands.len().saturating_sub(RECENT_COMMAND_COUNT);
    let recent_commands = commands[skip..].to_vec();

    let command_patterns = match mode {
        Mode::Command => store.command_patterns(),
        _ => None,
    };

    let recent_documents = match mode {
        Mode::Document => store
            .recent_documents(RECENT_DOCUMENT_COUNT)
            .into_iter()
            .map(|(path, annotation)| (path.to_string(), annotation.clone()))
            .collect(),
        _ => Vec::new(),
    };

    ContextSnapshot {
        system_prompt: profile.system_prompt.to_string(),
        history,
        cwd: store.environment().current_directory.clone(),
        recent_commands,
        command_patterns,
        recent_documents,
        environment_facts: Vec::new(),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
