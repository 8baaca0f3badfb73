//! Mode detection for free-text input.
//!
//! Classification runs layered heuristics in a fixed priority order:
//! document mode wins when the input references a file that actually
//! exists on disk *and* carries a document-action verb; otherwise the
//! input is tested against an ordered table of command-intent patterns;
//! anything left is conversational. The function is total — no input
//! string can make it fail.
//!
//! The pattern tables are literal data, not scattered conditionals, so the
//! priority order is independently checkable.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::assemble::ContextSnapshot;
use crate::models::Mode;

/// Verbs that signal the user wants a file processed, not merely mentioned.
/// Mentioning `script.sh` alone is not enough to leave conversation mode.
const DOCUMENT_ACTION_VERBS: &[&str] = &[
    "分析",
    "总结",
    "概括",
    "摘要",
    "阅读",
    "读取",
    "处理",
    "analyze",
    "summarize",
    "summarise",
    "read",
    "process",
    "extract",
    "examine",
    "review",
];

/// Ordered command-intent patterns. First match wins; all are applied
/// case-insensitively against the raw input.
static COMMAND_INTENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"如何.*命令",
        r"怎么用.*命令",
        r"解释.*命令",
        r"生成.*命令",
        r"运行.*命令",
        r"执行.*命令",
        r"命令.*什么意思",
        r"command",
        r"cmd",
        r"shell",
        r"如何在终端",
        r"help me",
        r"how to .*在终端",
        r"terminal",
        r"console",
        r"怎样才能",
        r"写一个脚本",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).expect("static pattern"))
    .collect()
});

static ABSOLUTE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/[\w./\-]+").expect("static pattern"));
static RELATIVE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w\-]+\.\w+").expect("static pattern"));
static HOME_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"~[\w./\-]+").expect("static pattern"));

/// Decide which handling mode applies to `input`.
///
/// Priority order: document (existing file + action verb), then command
/// (intent pattern match), then conversation. Candidate paths that do not
/// exist are silently discarded.
pub fn classify_mode(input: &str, _context: Option<&ContextSnapshot>) -> Mode {
    let has_existing_file = extract_path_candidates(input)
        .iter()
        .any(|p| p.exists());

    if has_existing_file && has_document_action_verb(input) {
        return Mode::Document;
    }

    if is_command_related(input) {
        return Mode::Command;
    }

    Mode::Conversation
}

/// Pull every substring that looks like a filesystem path: `/`-rooted
/// runs, `~`-prefixed runs (expanded against the home directory), and
/// bare `name.extension` tokens.
pub fn extract_path_candidates(input: &str) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    for m in ABSOLUTE_PATH_RE.find_iter(input) {
        candidates.push(PathBuf::from(m.as_str()));
    }

    for m in RELATIVE_PATH_RE.find_iter(input) {
        candidates.push(PathBuf::from(m.as_str()));
    }

    for m in HOME_PATH_RE.find_iter(input) {
        candidates.push(expand_home(m.as_str()));
    }

    candidates
}

/// Expand a leading `~` against the home directory; unknown homes leave
/// the path untouched (it will simply fail the existence test).
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}

fn has_document_action_verb(input: &str) -> bool {
    let lower = input.to_lowercase();
    DOCUMENT_ACTION_VERBS
        .iter()
        .any(|verb| lower.contains(&verb.to_lowercase()))
}

fn is_command_related(input: &str) -> bool {
    COMMAND_INTENT_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_question_is_conversation() {
        assert_eq!(
            classify_mode("what is the meaning of life", None),
            Mode::Conversation
        );
        assert_eq!(classify_mode("你好，请介绍一下自己", None), Mode::Conversation);
    }

    #[test]
    fn test_empty_and_whitespace_are_conversation() {
        assert_eq!(classify_mode("", None), Mode::Conversation);
        assert_eq!(classify_mode("   \t\n", None), Mode::Conversation);
    }

    #[test]
    fn test_command_keywords_detected() {
        assert_eq!(classify_mode("open a shell for me", None), Mode::Command);
        assert_eq!(
            classify_mode("解释命令 ps aux | grep python", None),
            Mode::Command
        );
        assert_eq!(
            classify_mode("how do I do this in the TERMINAL", None),
            Mode::Command
        );
    }

    #[test]
    fn test_existing_file_with_verb_is_document() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("notes.txt");
        std::fs::write(&file, "ten bytes!").unwrap();

        let input = format!("summarize {}", file.display());
        assert_eq!(classify_mode(&input, None), Mode::Document);
    }

    #[test]
    fn test_document_beats_command_keyword() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("script.sh");
        std::fs::write(&file, "#!/bin/sh\n").unwrap();

        // Contains both the "shell" command keyword and a document verb,
        // but the file exists: document wins.
        let input = format!("analyze the shell logic in {}", file.display());
        assert_eq!(classify_mode(&input, None), Mode::Document);
    }

    #[test]
    fn test_existing_file_without_verb_is_not_document() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("script.sh");
        std::fs::write(&file, "#!/bin/sh\n").unwrap();

        let input = format!("explain the command in {}", file.display());
        // No document verb, so it falls through to the command patterns.
        assert_eq!(classify_mode(&input, None), Mode::Command);
    }

    #[test]
    fn test_nonexistent_path_is_discarded() {
        assert_eq!(
            classify_mode("summarize /definitely/not/a/real/file.txt", None),
            Mode::Conversation
        );
    }

    #[test]
    fn test_path_extraction_finds_all_shapes() {
        let candidates = extract_path_candidates("compare /etc/hosts with backup.conf and ~/notes.md");
        let strings: Vec<String> = candidates
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        assert!(strings.iter().any(|s| s == "/etc/hosts"));
        assert!(strings.iter().any(|s| s == "backup.conf"));
        // The ~ candidate is expanded, so it no longer starts with a tilde.
        assert!(strings.iter().any(|s| s.ends_with("notes.md") && !s.starts_with('~')));
    }
}
