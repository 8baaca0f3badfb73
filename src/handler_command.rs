//! Shell-command assistance handler.
//!
//! Sub-classifies the request into explain / generate / optimize /
//! general, extracts the concrete command where one is required, enriches
//! the context with live environment facts, and builds one of four fixed
//! prompt templates.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::assemble::{assemble, mode_profile};
use crate::environment::EnvironmentSnapshot;
use crate::gateway::{ChatGateway, ChatRequest};
use crate::handler::{generate, HandlerResponse, ModeHandler};
use crate::models::Mode;
use crate::store::ContextStore;

/// What the user wants done with a command. Keyword tables are checked in
/// this order; the first hit wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Explain,
    Generate,
    Optimize,
    General,
}

const EXPLAIN_KEYWORDS: &[&str] = &["解释", "explain", "what does", "什么意思", "怎么理解"];
const GENERATE_KEYWORDS: &[&str] = &["生成", "创建", "generate", "create", "写一个"];
const OPTIMIZE_KEYWORDS: &[&str] = &["优化", "改进", "optimize", "improve", "更好"];

static QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'`]([^"'`]+)["'`]"#).expect("static pattern"));

/// Text following an explain/optimize verb, through end of input. The
/// verb may have "命令"/"the command" attached before the whitespace.
static AFTER_VERB_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)解释(?:命令)?\s+(.+)$",
        r"(?i)explain(?:\s+the\s+command)?\s+(.+)$",
        r"(?i)优化(?:命令)?\s+(.+)$",
        r"(?i)optimize\s+(.+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// Classify the request type by keyword.
pub fn detect_action(input: &str) -> CommandAction {
    let lower = input.to_lowercase();

    if EXPLAIN_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        CommandAction::Explain
    } else if GENERATE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        CommandAction::Generate
    } else if OPTIMIZE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        CommandAction::Optimize
    } else {
        CommandAction::General
    }
}

/// Pull the concrete command out of the input: a quoted substring first,
/// then whatever follows an explain/optimize verb. `None` means the user
/// must be asked for the command instead of calling the model.
pub fn extract_command(input: &str) -> Option<String> {
    if let Some(captures) = QUOTED_RE.captures(input) {
        return Some(captures[1].trim().to_string());
    }

    for pattern in AFTER_VERB_RES.iter() {
        if let Some(captures) = pattern.captures(input) {
            let command = captures[1].trim();
            if !command.is_empty() {
                return Some(command.to_string());
            }
        }
    }

    None
}

pub struct CommandHandler<'a> {
    gateway: &'a dyn ChatGateway,
    stream: bool,
}

impl<'a> CommandHandler<'a> {
    pub fn new(gateway: &'a dyn ChatGateway, stream: bool) -> Self {
        Self { gateway, stream }
    }
}

#[async_trait]
impl ModeHandler for CommandHandler<'_> {
    async fn handle(&self, input: &str, store: &mut ContextStore) -> Result<HandlerResponse> {
        let mut snapshot = assemble(Mode::Command, store);

        // Live environment facts, refreshed on every call. Probe failures
        // have already degraded to "Unknown" inside the snapshot.
        let env = EnvironmentSnapshot::capture();
        if env.cwd.is_some() {
            snapshot.cwd = env.cwd.clone();
        }
        snapshot
            .environment_facts
            .push(("OS version".to_string(), env.os_version.clone()));
        snapshot
            .environment_facts
            .push(("Shell version".to_string(), env.shell_version.clone()));
        for (key, value) in &env.variables {
            snapshot
                .environment_facts
                .push((key.clone(), value.clone()));
        }

        let action = detect_action(input);
        tracing::debug!("Command request classified as {:?}", action);

        let prompt = match action {
            CommandAction::Explain => {
                let Some(command) = extract_command(input) else {
                    return Ok(HandlerResponse::local(
                        "I need a specific command to explain. Please provide the exact command.",
                    ));
                };
                format!(
                    "Explain in detail what this command does and how it is used: `{}`. \
                     Cover the purpose of each flag and typical scenarios where it applies.",
                    command
                )
            }
            CommandAction::Optimize => {
                let Some(command) = extract_command(input) else {
                    return Ok(HandlerResponse::local(
                        "I need a specific command to optimize. Please provide the exact command.",
                    ));
                };
                format!(
                    "Optimize this command to be more efficient and safer, and explain the \
                     reasoning behind each change: `{}`",
                    command
                )
            }
            CommandAction::Generate => format!(
                "Generate a command suited to the shell environment described in the context \
                 for this requirement: {}",
                input
            ),
            CommandAction::General => input.to_string(),
        };

        let request = ChatRequest {
            system_prompt: snapshot.system_prompt_with_context(),
            history: snapshot.history.clone(),
            user_message: prompt,
            params: mode_profile(Mode::Command).params,
        };

        generate(self.gateway, &request, self.stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationParams;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    /// Gateway that records whether it was called at all.
    struct TracingFake {
        called: AtomicBool,
    }

    #[async_trait]
    impl ChatGateway for TracingFake {
        async fn complete(&self, _request: &ChatRequest) -> Result<String> {
            self.called.store(true, Ordering::SeqCst);
            Ok("ok".to_string())
        }

        async fn stream(
            &self,
            _request: &ChatRequest,
        ) -> Result<mpsc::Receiver<Result<String>>> {
            self.called.store(true, Ordering::SeqCst);
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    /// Gateway that captures the request it receives.
    struct CapturingFake {
        seen: std::sync::Mutex<Option<ChatRequest>>,
    }

    #[async_trait]
    impl ChatGateway for CapturingFake {
        async fn complete(&self, request: &ChatRequest) -> Result<String> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok("answer".to_string())
        }

        async fn stream(
            &self,
            _request: &ChatRequest,
        ) -> Result<mpsc::Receiver<Result<String>>> {
            unimplemented!("not streamed in tests")
        }
    }

    #[test]
    fn test_detect_action_first_match_wins() {
        assert_eq!(detect_action("explain ls -la"), CommandAction::Explain);
        assert_eq!(detect_action("解释命令 ps aux"), CommandAction::Explain);
        assert_eq!(
            detect_action("generate a backup script"),
            CommandAction::Generate
        );
        assert_eq!(detect_action("optimize my loop"), CommandAction::Optimize);
        assert_eq!(detect_action("which flag lists hidden files"), CommandAction::General);
        // "what does ... create" hits explain before generate.
        assert_eq!(
            detect_action("what does mkdir create"),
            CommandAction::Explain
        );
    }

    #[test]
    fn test_extract_command_prefers_quotes() {
        assert_eq!(
            extract_command("explain 'ls -la | head' for me").as_deref(),
            Some("ls -la | head")
        );
        assert_eq!(
            extract_command("optimize \"du -sh *\" please").as_deref(),
            Some("du -sh *")
        );
    }

    #[test]
    fn test_extract_command_after_verb() {
        assert_eq!(
            extract_command("解释命令 ps aux | grep python").as_deref(),
            Some("ps aux | grep python")
        );
        assert_eq!(
            extract_command("explain tar -xzf archive.tgz").as_deref(),
            Some("tar -xzf archive.tgz")
        );
        assert_eq!(extract_command("just chatting here"), None);
    }

    #[tokio::test]
    async fn test_explain_without_command_skips_model() {
        let tmp = TempDir::new().unwrap();
        let mut store = ContextStore::load(tmp.path(), 10).unwrap();
        let fake = TracingFake {
            called: AtomicBool::new(false),
        };

        let handler = CommandHandler::new(&fake, false);
        let response = handler.handle("explain  ", &mut store).await.unwrap();

        assert!(response.text.contains("I need a specific command"));
        assert!(!fake.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_explain_embeds_command_and_params() {
        let tmp = TempDir::new().unwrap();
        let mut store = ContextStore::load(tmp.path(), 10).unwrap();
        let fake = CapturingFake {
            seen: std::sync::Mutex::new(None),
        };

        let handler = CommandHandler::new(&fake, false);
        let response = handler
            .handle("解释命令 ps aux | grep python", &mut store)
            .await
            .unwrap();
        assert_eq!(response.text, "answer");

        let request = fake.seen.lock().unwrap().take().unwrap();
        assert!(request.user_message.contains("`ps aux | grep python`"));
        assert_eq!(
            request.params,
            GenerationParams {
                temperature: 0.4,
                max_tokens: 512,
                top_p: 0.8
            }
        );
    }

    #[tokio::test]
    async fn test_environment_facts_reach_system_prompt() {
        let tmp = TempDir::new().unwrap();
        let mut store = ContextStore::load(tmp.path(), 10).unwrap();
        let fake = CapturingFake {
            seen: std::sync::Mutex::new(None),
        };

        let handler = CommandHandler::new(&fake, false);
        handler
            .handle("how do I list files, shell style", &mut store)
            .await
            .unwrap();

        let request = fake.seen.lock().unwrap().take().unwrap();
        assert!(request.system_prompt.contains("OS version:"));
        assert!(request.system_prompt.contains("Shell version:"));
    }
}
