//! Shell-command hook handler: runs an external process as a hook.
//!
//! The handler's context is serialized to JSON and written to the child's stdin; the exit
//! code selects the resulting action. stdout, if non-empty and valid JSON, can carry a
//! `Replace` or `Reprompt` payload; otherwise its text becomes the halt/finish message.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Hook, HookAction, HookContext};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Exit code 0: continue. 1: skip just this action (tool call replaced, turn continues) with
/// stdout/stderr as the replacement content. 2: halt with stdout/stderr as the message.
pub struct ShellHook {
    pub command: String,
    pub timeout: Duration,
}

impl ShellHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Hook for ShellHook {
    async fn call(&self, ctx: &HookContext) -> HookAction {
        let stdin_payload = json!({
            "agent_name": ctx.agent_name,
            "tool_name": ctx.tool_name,
            "tool_arguments": ctx.tool_arguments,
            "prompt": ctx.prompt,
            "payload": ctx.payload,
        });

        let run = async {
            let mut child = Command::new("sh")
                .arg("-c")
                .arg(&self.command)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| format!("failed to spawn hook command: {e}"))?;

            if let Some(mut stdin) = child.stdin.take() {
                let bytes = serde_json::to_vec(&stdin_payload).unwrap_or_default();
                let _ = stdin.write_all(&bytes).await;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| format!("hook command wait failed: {e}"))?;
            Ok::<_, String>(output)
        };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(msg)) => return HookAction::Halt(msg),
            Err(_) => return HookAction::Halt(format!("hook '{}' timed out", self.command)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if !stdout.is_empty() { stdout.clone() } else { stderr };

        match output.status.code() {
            Some(0) => {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&stdout) {
                    if let Some(reprompt) = value.get("reprompt").and_then(|v| v.as_str()) {
                        return HookAction::Reprompt(reprompt.to_string());
                    }
                    if let Some(replace) = value.get("replace") {
                        return HookAction::Replace(replace.clone());
                    }
                }
                HookAction::Continue
            }
            Some(1) => HookAction::Replace(serde_json::Value::String(message)),
            _ => HookAction::Halt(message),
        }
    }
}
