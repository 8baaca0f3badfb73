//! Document analysis handler.
//!
//! Resolves the target file from the input, walks a validation ladder
//! (path found → file exists → type supported → size within the
//! per-extension ceiling) with a distinct user-facing message at each
//! rung, reads the content with lossy UTF-8 decoding, and builds a
//! type-aware prompt for summarize / analyze / extract requests.
//! Summaries and analyses of source-code files are written back into the
//! document annotation map.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::assemble::{assemble, mode_profile};
use crate::classify::expand_home;
use crate::gateway::{ChatGateway, ChatRequest};
use crate::handler::{generate, HandlerResponse, ModeHandler};
use crate::models::Mode;
use crate::store::ContextStore;

/// Supported extensions with their size ceilings in bytes. Ordered so the
/// path-extraction regexes try text formats before code and config.
const SUPPORTED_FILE_TYPES: &[(&str, u64)] = &[
    // Text and markup
    (".txt", 1024 * 1024),
    (".md", 1024 * 1024),
    (".json", 1024 * 1024),
    (".csv", 1024 * 1024),
    (".xml", 1024 * 1024),
    (".yaml", 1024 * 1024),
    (".yml", 1024 * 1024),
    // Source code
    (".py", 512 * 1024),
    (".js", 512 * 1024),
    (".java", 512 * 1024),
    (".c", 512 * 1024),
    (".cpp", 512 * 1024),
    (".h", 512 * 1024),
    (".html", 512 * 1024),
    (".css", 512 * 1024),
    (".sh", 512 * 1024),
    (".go", 512 * 1024),
    (".rs", 512 * 1024),
    // Config formats
    (".ini", 256 * 1024),
    (".conf", 256 * 1024),
    (".config", 256 * 1024),
    (".properties", 256 * 1024),
    (".toml", 256 * 1024),
    // Logs
    (".log", 2 * 1024 * 1024),
];

/// Extensions whose summaries/analyses are cached in the annotation map.
const CODE_EXTENSIONS: &[&str] = &[".py", ".js", ".java", ".c", ".cpp", ".go", ".rs"];

const CONFIG_EXTENSIONS: &[&str] = &[".json", ".yaml", ".yml", ".xml", ".toml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentAction {
    Summarize,
    Analyze,
    Extract,
}

/// What kind of information an extract request is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractKind {
    Dates,
    Emails,
    Urls,
    Functions,
    General,
}

static QUOTED_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']([^"']*\.\w+)["']"#).expect("static pattern"));

/// One `token.ext` adjacency pattern per supported extension, in table
/// order.
static EXTENSION_PATH_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    SUPPORTED_FILE_TYPES
        .iter()
        .map(|(ext, _)| {
            Regex::new(&format!(r"(\S+{})\b", regex::escape(ext))).expect("static pattern")
        })
        .collect()
});

/// Classify the document request. Summarize is the default when no
/// keyword matches.
pub fn detect_action(input: &str) -> DocumentAction {
    let lower = input.to_lowercase();

    if ["总结", "概括", "summarize", "summary"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        DocumentAction::Summarize
    } else if ["分析", "analyze", "analysis"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        DocumentAction::Analyze
    } else if ["提取", "extract", "抽取"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        DocumentAction::Extract
    } else {
        DocumentAction::Summarize
    }
}

/// Classify what an extract request wants, purely by keyword presence.
pub fn detect_extract_kind(input: &str) -> ExtractKind {
    let lower = input.to_lowercase();

    if ["日期", "日志", "date"].iter().any(|kw| lower.contains(kw)) {
        ExtractKind::Dates
    } else if ["邮箱", "email"].iter().any(|kw| lower.contains(kw)) {
        ExtractKind::Emails
    } else if ["链接", "网址", "url"].iter().any(|kw| lower.contains(kw)) {
        ExtractKind::Urls
    } else if ["函数", "方法", "function", "method"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        ExtractKind::Functions
    } else {
        ExtractKind::General
    }
}

/// Find the target file reference in the input: a quoted path first, then
/// the first `token.ext` adjacency for any supported extension.
pub fn extract_file_reference(input: &str) -> Option<String> {
    if let Some(captures) = QUOTED_PATH_RE.captures(input) {
        return Some(captures[1].to_string());
    }

    for pattern in EXTENSION_PATH_RES.iter() {
        if let Some(captures) = pattern.captures(input) {
            return Some(captures[1].to_string());
        }
    }

    None
}

/// Expand `~` and make the reference absolute against the working
/// directory.
fn resolve_path(reference: &str) -> PathBuf {
    let expanded = expand_home(reference);
    if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

fn size_limit_for(extension: &str) -> Option<u64> {
    SUPPORTED_FILE_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, limit)| *limit)
}

fn is_code_file(extension: &str) -> bool {
    CODE_EXTENSIONS.contains(&extension)
}

pub struct DocumentHandler<'a> {
    gateway: &'a dyn ChatGateway,
    stream: bool,
}

impl<'a> DocumentHandler<'a> {
    pub fn new(gateway: &'a dyn ChatGateway, stream: bool) -> Self {
        Self { gateway, stream }
    }

    fn build_prompt(
        action: DocumentAction,
        extension: &str,
        content: &str,
        input: &str,
    ) -> String {
        match action {
            DocumentAction::Summarize => {
                let mut prompt = format!(
                    "Summarize the following file content:\n\n{}",
                    content
                );
                let lower = input.to_lowercase();
                if lower.contains("要点") || lower.contains("关键点") || lower.contains("key points")
                {
                    prompt.push_str("\n\nPresent the main content as bullet points.");
                } else if lower.contains("摘要") || lower.contains("abstract") {
                    prompt.push_str("\n\nProvide a short abstract.");
                }
                prompt
            }
            DocumentAction::Analyze => {
                if is_code_file(extension) || extension == ".sh" || extension == ".h" {
                    format!(
                        "Analyze the following code file: its purpose, structure, key \
                         components, and any potential problems.\n\n{}",
                        content
                    )
                } else if extension == ".log" {
                    format!(
                        "Analyze the following log file and identify significant events, \
                         errors, and recurring patterns.\n\n{}",
                        content
                    )
                } else if CONFIG_EXTENSIONS.contains(&extension) {
                    format!(
                        "Analyze the following configuration file and explain the main \
                         settings and their effects.\n\n{}",
                        content
                    )
                } else {
                    format!(
                        "Analyze the following text in depth: its topic, structure, and key \
                         information.\n\n{}",
                        content
                    )
                }
            }
            DocumentAction::Extract => match detect_extract_kind(input) {
                ExtractKind::Dates => format!(
                    "Extract every date and time reference from the following content:\n\n{}",
                    content
                ),
                ExtractKind::Emails => format!(
                    "Extract every email address from the following content:\n\n{}",
                    content
                ),
                ExtractKind::Urls => format!(
                    "Extract every URL and link from the following content:\n\n{}",
                    content
                ),
                ExtractKind::Functions => format!(
                    "Extract every function and method definition from the following code, \
                     with parameters and a one-line description of each:\n\n{}",
                    content
                ),
                ExtractKind::General => format!(
                    "Extract the key information from the following content:\n\n{}\n\n\
                     Specific request: {}",
                    content, input
                ),
            },
        }
    }
}

#[async_trait]
impl ModeHandler for DocumentHandler<'_> {
    async fn handle(&self, input: &str, store: &mut ContextStore) -> Result<HandlerResponse> {
        let snapshot = assemble(Mode::Document, store);

        let Some(reference) = extract_file_reference(input) else {
            return Ok(HandlerResponse::local(
                "I couldn't identify the file path in your request. \
                 Please specify the file explicitly.",
            ));
        };

        let path = resolve_path(&reference);
        if !path.is_file() {
            return Ok(HandlerResponse::local(format!(
                "The file '{}' does not exist. Please check the path.",
                path.display()
            )));
        }

        let Some(extension) = extension_of(&path) else {
            return Ok(HandlerResponse::local(unsupported_type_message()));
        };
        let Some(limit) = size_limit_for(&extension) else {
            return Ok(HandlerResponse::local(unsupported_type_message()));
        };

        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if size > limit {
            return Ok(HandlerResponse::local(format!(
                "The file is too large to process. The maximum size for {} files is {} KB.",
                extension,
                limit / 1024
            )));
        }

        // Lossy decode: malformed bytes become replacement characters
        // instead of failing the request.
        let content = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Err(e) => {
                return Ok(HandlerResponse::local(format!(
                    "Failed to read the file: {}",
                    e
                )));
            }
        };

        // Canonical key for the annotation map: two spellings of the same
        // file must collide.
        let canonical = std::fs::canonicalize(&path).unwrap_or(path);
        let canonical_str = canonical.to_string_lossy().to_string();

        let action = detect_action(input);
        tracing::debug!(
            "Document request classified as {:?} for {}",
            action,
            canonical_str
        );

        let prompt = Self::build_prompt(action, &extension, &content, input);

        let request = ChatRequest {
            system_prompt: snapshot.system_prompt_with_context(),
            history: snapshot.history.clone(),
            user_message: prompt,
            params: mode_profile(Mode::Document).params,
        };

        let response = generate(self.gateway, &request, self.stream).await?;

        if is_code_file(&extension) {
            match action {
                DocumentAction::Summarize => {
                    store.annotate_document(&canonical_str, Some(response.text.clone()), None);
                }
                DocumentAction::Analyze => {
                    store.annotate_document(&canonical_str, None, Some(response.text.clone()));
                }
                DocumentAction::Extract => {}
            }
        }

        Ok(response)
    }
}

fn unsupported_type_message() -> String {
    let extensions: Vec<&str> = SUPPORTED_FILE_TYPES.iter().map(|(ext, _)| *ext).collect();
    format!(
        "Unsupported file type. Supported types: {}",
        extensions.join(", ")
    )
}
