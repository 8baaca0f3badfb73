//! Live environment facts.
//!
//! Captures the working directory, a filtered set of environment
//! variables, and best-effort OS/shell version probes. Probe failures
//! degrade to `"Unknown"` — enriching a prompt must never abort the
//! request it enriches.

use std::collections::BTreeMap;
use std::process::Command;

/// Environment variables worth forwarding to the model. Anything starting
/// with `PATH` is included alongside these exact names.
const FORWARDED_VARS: &[&str] = &["HOME", "USER", "SHELL"];

/// Snapshot of the process environment at capture time. Pure data.
#[derive(Debug, Clone)]
pub struct EnvironmentSnapshot {
    pub cwd: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub os_version: String,
    pub shell_version: String,
}

impl EnvironmentSnapshot {
    /// Capture the current environment, including version probes.
    pub fn capture() -> Self {
        let cwd = std::env::current_dir()
            .ok()
            .map(|p| p.to_string_lossy().to_string());

        Self {
            cwd,
            variables: filtered_env_vars(),
            os_version: probe_os_version(),
            shell_version: probe_shell_version(),
        }
    }

    /// Capture without running subprocess probes. Used where only the
    /// cheap facts are needed (e.g. seeding the persisted store).
    pub fn capture_basic() -> Self {
        let cwd = std::env::current_dir()
            .ok()
            .map(|p| p.to_string_lossy().to_string());

        Self {
            cwd,
            variables: filtered_env_vars(),
            os_version: String::new(),
            shell_version: String::new(),
        }
    }
}

fn filtered_env_vars() -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("PATH") || FORWARDED_VARS.contains(&key.as_str()))
        .collect()
}

/// OS version: `sw_vers` on macOS, `uname -sr` elsewhere.
fn probe_os_version() -> String {
    run_probe("sw_vers", &["-productVersion"])
        .or_else(|| run_probe("uname", &["-sr"]))
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Shell version: first output line of `$SHELL --version`.
fn probe_shell_version() -> String {
    let Ok(shell) = std::env::var("SHELL") else {
        return "Unknown".to_string();
    };

    run_probe(&shell, &["--version"])
        .and_then(|out| out.lines().next().map(|l| l.to_string()))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn run_probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_includes_filtered_vars_only() {
        std::env::set_var("AI_TERMINAL_UNRELATED", "x");
        let snapshot = EnvironmentSnapshot::capture_basic();
        assert!(!snapshot.variables.contains_key("AI_TERMINAL_UNRELATED"));
        for key in snapshot.variables.keys() {
            assert!(
                key.starts_with("PATH") || FORWARDED_VARS.contains(&key.as_str()),
                "unexpected variable captured: {}",
                key
            );
        }
    }

    #[test]
    fn test_probe_failure_degrades_to_unknown() {
        let result = run_probe("definitely-not-a-real-program-xyz", &[]);
        assert!(result.is_none());
    }

    #[test]
    fn test_capture_has_cwd() {
        let snapshot = EnvironmentSnapshot::capture_basic();
        assert!(snapshot.cwd.is_some());
    }
}
