//! Context statistics overview.
//!
//! Prints a quick summary of what AI Terminal remembers: conversation
//! counts per mode, the command log, annotated documents, and when the
//! store was last active. Used by `ai stats` to give confidence that
//! context is being captured and persisted as expected.

use chrono::{DateTime, Utc};

use crate::models::Mode;
use crate::store::ContextStore;

/// Run the stats command: inspect the store and print a summary.
pub fn run_stats(store: &ContextStore) {
    let conversation = store.conversation();
    let per_mode = |mode: Mode| conversation.iter().filter(|e| e.mode == mode).count();

    let state_size = std::fs::metadata(store.state_file())
        .map(|m| m.len())
        .unwrap_or(0);

    println!("AI Terminal — Context Stats");
    println!("===========================");
    println!();
    println!("  State file:  {}", store.state_file().display());
    println!("  Size:        {}", format_bytes(state_size));
    println!();
    println!("  Exchanges:   {}", conversation.len());
    println!("    conversation: {}", per_mode(Mode::Conversation));
    println!("    command:      {}", per_mode(Mode::Command));
    println!("    document:     {}", per_mode(Mode::Document));
    println!("  Commands:    {}", store.commands().len());
    println!("  Documents:   {}", store.documents().len());

    if let Some(patterns) = store.command_patterns() {
        let tools: Vec<&str> = patterns
            .preferred_tools
            .iter()
            .map(|t| t.as_str())
            .collect();
        println!();
        println!("  Command complexity: {}", patterns.complexity.as_str());
        println!("  Preferred tools:    {}", tools.join(", "));
    }

    let last_activity = conversation
        .iter()
        .map(|e| e.timestamp)
        .chain(store.commands().iter().map(|e| e.timestamp))
        .max();

    if let Some(ts) = last_activity {
        println!();
        println!("  Last activity: {}", format_ts_relative(ts));
    }

    println!();
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
