//! Tool permission rules.
//!
//! File-tool access is governed by glob allow/deny lists; shell-command access by regex
//! allow/deny lists. Deny always wins over allow. `allow_filesystem_tools = false` is a
//! process-wide hard boundary validated once at build time, not a per-call permission check.

use regex::Regex;
use serde_json::Value;

use crate::error::{ConfigError, PermissionError};

/// Compiles a glob-like pattern (`*`, `**`, literal path separators) into a regex. A small
/// hand-rolled translator rather than pulling in a dedicated glob crate, since the patterns
/// in practice are simple path prefixes and suffixes.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '.' | '+' | '(' | ')' | '[' | ']' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    Regex::new(&out)
}

#[derive(Clone, Debug, Default)]
pub struct FilePermissions {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl FilePermissions {
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            allow: allow.iter().map(|p| glob_to_regex(p)).collect::<Result<_, _>>()?,
            deny: deny.iter().map(|p| glob_to_regex(p)).collect::<Result<_, _>>()?,
        })
    }

    /// Deny wins; if neither list matches, access is allowed only when `allow` is empty
    /// (an empty allowlist means "no restriction").
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.deny.iter().any(|re| re.is_match(path)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|re| re.is_match(path))
    }
}

#[derive(Clone, Debug, Default)]
pub struct ShellPermissions {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl ShellPermissions {
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            allow: allow.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?,
            deny: deny.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?,
        })
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        if self.deny.iter().any(|re| re.is_match(command)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|re| re.is_match(command))
    }
}

/// A tool call's permission wrapper: file-tool calls are checked against `files` by their
/// `path` argument, shell-tool calls against `shell` by their `command` argument. A call with
/// neither argument (most tools) passes through unchecked.
#[derive(Clone, Debug, Default)]
pub struct ToolPermissions {
    pub files: FilePermissions,
    pub shell: ShellPermissions,
}

impl ToolPermissions {
    /// Checks `arguments` for a `path` or `command` field and validates it against the
    /// matching permission list, returning the denial as a tool-level error rather than an
    /// engine failure (spec's "permission denials surfaced as tool results").
    pub fn check(&self, tool_name: &str, arguments: &Value) -> Result<(), PermissionError> {
        if let Some(path) = arguments.get("path").and_then(Value::as_str) {
            if !self.files.is_allowed(path) {
                return Err(PermissionError {
                    tool: tool_name.to_string(),
                    reason: format!("path '{path}' is not permitted"),
                });
            }
        }
        if let Some(command) = arguments.get("command").and_then(Value::as_str) {
            if !self.shell.is_allowed(command) {
                return Err(PermissionError {
                    tool: tool_name.to_string(),
                    reason: format!("command '{command}' is not permitted"),
                });
            }
        }
        Ok(())
    }
}

/// Process-wide boundary: when `false`, every filesystem tool is rejected at registry-build
/// time rather than per call.
pub fn validate_filesystem_boundary(
    allow_filesystem_tools: bool,
    requested_tools: &[String],
    filesystem_tool_names: &[String],
) -> Result<(), ConfigError> {
    if allow_filesystem_tools {
        return Ok(());
    }
    if let Some(name) = requested_tools
        .iter()
        .find(|t| filesystem_tool_names.contains(t))
    {
        return Err(ConfigError::ForbiddenTool(name.clone()));
    }
    Ok(())
}
