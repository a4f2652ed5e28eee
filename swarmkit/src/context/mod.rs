//! Per-agent context window management.
//!
//! A stateful manager that owns ephemeral content, progressive compression, orphan-tool-call
//! pruning, and token accounting for one `AgentInstance`.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::message::{Content, ContentPart, Message, Role};

const CHARS_PER_TOKEN: usize = 4;

/// Rough token estimate when a provider hasn't reported real usage yet.
pub fn estimate_tokens(messages: &[Message]) -> u64 {
    let chars: usize = messages.iter().map(|m| m.content.len_chars() + 8).sum();
    (chars / CHARS_PER_TOKEN) as u64
}

/// Age bucket -> max retained characters for progressive compression.
fn bucket_limit(messages_ago: usize) -> Option<usize> {
    match messages_ago {
        0..=10 => None,
        11..=20 => Some(1000),
        21..=40 => Some(500),
        41..=60 => Some(200),
        _ => Some(100),
    }
}

/// Tools whose output can be regenerated on demand; their compressed results get an
/// appended "re-run the tool" hint instead of just a generic truncation notice, and their
/// results carry read-tracking metadata on the `tool_result` event.
const RERUNNABLE_TOOLS: &[&str] = &[
    "Read", "Search", "Glob", "Grep", "MemoryRead", "MemorySearch",
];

/// Whether `tool_name` is one of the read-style tools whose results are rerunnable and whose
/// `tool_result` events carry `read_digest`/`read_path` metadata.
pub(crate) fn is_rerunnable_tool(tool_name: &str) -> bool {
    RERUNNABLE_TOOLS.contains(&tool_name)
}

fn truncate_chars(s: &str, max: usize, tool_name: Option<&str>) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    match tool_name.filter(|name| RERUNNABLE_TOOLS.contains(name)) {
        Some(name) => format!(
            "{truncated}... [truncated for context management; re-run the {name} tool if you need the full output]"
        ),
        None => format!("{truncated}... [truncated for context management]"),
    }
}

/// Folds an ephemeral note into `content` as an additional part, preserving whatever was
/// already there (plain text becomes a one-element part list first).
fn fold_note_into(content: &Content, note: &str) -> Content {
    let mut parts = match content {
        Content::Text(s) if s.is_empty() => vec![],
        Content::Text(s) => vec![ContentPart::Text { text: s.clone() }],
        Content::Parts(parts) => parts.clone(),
    };
    parts.push(ContentPart::Text { text: note.to_string() });
    Content::Parts(parts)
}

/// Looks back through `preceding` for the assistant tool_call that produced `tool_call_id`,
/// returning its tool name.
fn originating_tool_name(preceding: &[Message], tool_call_id: &str) -> Option<String> {
    preceding.iter().rev().find_map(|m| {
        m.tool_calls
            .iter()
            .find(|tc| tc.id == tool_call_id)
            .map(|tc| tc.name.clone())
    })
}

/// Per-agent context manager: owns ephemeral (non-persisted) content and the compression/
/// pruning state machine. `prepare_for_llm` never mutates the caller's stored conversation;
/// it returns a fresh `Vec<Message>`.
pub struct ContextManager {
    max_context_tokens: Option<u64>,
    reserve_tokens: u64,
    /// Ephemeral notes keyed by the index of the message they are attached after, never
    /// persisted to a snapshot verbatim.
    ephemeral: HashMap<usize, Vec<String>>,
    compression_applied: bool,
    threshold_hits: HashSet<u8>,
    system_reminder_re: Regex,
}

impl ContextManager {
    pub fn new(max_context_tokens: Option<u64>) -> Self {
        Self {
            max_context_tokens,
            reserve_tokens: 4096,
            ephemeral: HashMap::new(),
            compression_applied: false,
            threshold_hits: HashSet::new(),
            system_reminder_re: Regex::new(r"(?s)<system-reminder>.*?</system-reminder>").unwrap(),
        }
    }

    pub fn with_reserve_tokens(mut self, reserve: u64) -> Self {
        self.reserve_tokens = reserve;
        self
    }

    /// Whether the one-shot 60% compression action has already fired, for snapshotting.
    pub fn compression_applied(&self) -> bool {
        self.compression_applied
    }

    /// Thresholds (60/80/90) already crossed this instance's lifetime, for snapshotting.
    pub fn threshold_hits(&self) -> Vec<u8> {
        let mut hits: Vec<u8> = self.threshold_hits.iter().copied().collect();
        hits.sort_unstable();
        hits
    }

    /// Restores latch state captured by a prior `compression_applied`/`threshold_hits`, so a
    /// resumed instance doesn't re-fire threshold events or re-run compression it already did
    /// before the snapshot was taken.
    pub fn restore_latch_state(&mut self, compression_applied: bool, threshold_hits: &[u8]) {
        self.compression_applied = compression_applied;
        self.threshold_hits = threshold_hits.iter().copied().collect();
    }

    /// Drops all ephemeral notes. Called once per completed turn, regardless of whether the
    /// turn succeeded or failed.
    pub fn clear_ephemeral(&mut self) {
        self.ephemeral.clear();
    }

    fn attach_ephemeral(&mut self, after_index: usize, note: String) {
        self.ephemeral.entry(after_index).or_default().push(note);
    }

    /// Strips `<system-reminder>...</system-reminder>` blocks out of message content before
    /// they are persisted to the stored conversation.
    pub fn strip_system_reminders(&self, text: &str) -> String {
        self.system_reminder_re.replace_all(text, "").to_string()
    }

    fn current_tokens(&self, messages: &[Message]) -> u64 {
        let latest_usage = messages
            .iter()
            .rev()
            .find_map(|m| if m.role == Role::Assistant { m.usage } else { None });
        match latest_usage {
            Some(u) => u.input_tokens + u.output_tokens,
            None => estimate_tokens(messages),
        }
    }

    fn limit_fraction(&self, messages: &[Message]) -> Option<f64> {
        let limit = self.max_context_tokens?;
        if limit == 0 {
            return None;
        }
        Some(self.current_tokens(messages) as f64 / limit as f64)
    }

    /// Cumulative input tokens: the latest assistant message's reported `input_tokens`
    /// (providers report input-token usage cumulatively, not per turn).
    pub fn cumulative_input_tokens(&self, messages: &[Message]) -> u64 {
        messages
            .iter()
            .rev()
            .find_map(|m| if m.role == Role::Assistant { m.usage } else { None })
            .map(|u| u.input_tokens)
            .unwrap_or(0)
    }

    /// Cumulative output tokens: summed across every assistant message (each turn's output
    /// is independent, unlike input which providers report cumulatively).
    pub fn cumulative_output_tokens(&self, messages: &[Message]) -> u64 {
        messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .filter_map(|m| m.usage)
            .map(|u| u.output_tokens)
            .sum()
    }

    /// Percentage of the context window consumed, rounded to two decimals; `0.0` if the
    /// model's context limit is unknown.
    pub fn context_usage_percentage(&self, messages: &[Message]) -> f64 {
        match self.limit_fraction(messages) {
            Some(frac) => (frac * 100.0 * 100.0).round() / 100.0,
            None => 0.0,
        }
    }

    /// Tokens remaining before the limit; may be negative once over budget.
    pub fn tokens_remaining(&self, messages: &[Message]) -> Option<i64> {
        let limit = self.max_context_tokens?;
        Some(limit as i64 - self.current_tokens(messages) as i64)
    }

    /// Emits `ContextThresholdHit` events at 60/80/90% crossings (each fires once per
    /// instance lifetime) and drives the one-shot progressive compression pass at 60%.
    /// The 60% event still fires on every new crossing even after compression has already
    /// run once; the compression action itself never repeats.
    ///
    /// Returns `(thresholds_newly_hit, compression_applied_this_call)`.
    pub fn check_thresholds(&mut self, messages: &[Message]) -> (Vec<u8>, bool) {
        let Some(frac) = self.limit_fraction(messages) else {
            return (vec![], false);
        };
        let pct = frac * 100.0;
        let mut newly_hit = Vec::new();
        let mut compressed_now = false;

        for threshold in [60u8, 80, 90] {
            if pct >= threshold as f64 && self.threshold_hits.insert(threshold) {
                newly_hit.push(threshold);
            }
        }
        if pct >= 60.0 && !self.compression_applied {
            compressed_now = true;
            self.compression_applied = true;
        }
        (newly_hit, compressed_now)
    }

    /// Applies age-bucketed truncation to tool-result messages older than the 10 most
    /// recent, returning a new message list. Non-tool-result messages pass through
    /// unchanged regardless of age.
    pub fn compress(&self, messages: &[Message]) -> Vec<Message> {
        let total = messages.len();
        messages
            .iter()
            .enumerate()
            .map(|(idx, msg)| {
                if msg.role != Role::Tool {
                    return msg.clone();
                }
                let messages_ago = total.saturating_sub(idx + 1);
                match bucket_limit(messages_ago) {
                    None => msg.clone(),
                    Some(limit) => {
                        let tool_name = msg
                            .tool_call_id
                            .as_deref()
                            .and_then(|id| originating_tool_name(&messages[..idx], id));
                        let mut copy = msg.clone();
                        copy.content = Content::Text(truncate_chars(
                            &msg.content.as_text(),
                            limit,
                            tool_name.as_deref(),
                        ));
                        copy
                    }
                }
            })
            .collect()
    }

    /// Detects and strips orphaned tool calls (assistant `tool_calls` with no matching
    /// `tool_result` later in the conversation), returning the pruned message list plus a
    /// human-readable description of every call removed, for an injected ephemeral note.
    /// Run after a provider rejects a request for referencing tool calls with no matching
    /// result.
    pub fn prune_orphans(&mut self, messages: &[Message]) -> (Vec<Message>, Vec<String>) {
        let mut out = Vec::with_capacity(messages.len());
        let mut removed = Vec::new();

        for (idx, msg) in messages.iter().enumerate() {
            let rest = &messages[idx + 1..];
            let orphan_ids = msg.orphaned_tool_call_ids(rest);
            if orphan_ids.is_empty() {
                out.push(msg.clone());
                continue;
            }
            let mut copy = msg.clone();
            for call in &msg.tool_calls {
                if orphan_ids.contains(&call.id) {
                    removed.push(format!("{}({})", call.name, call.arguments));
                }
            }
            copy.tool_calls.retain(|tc| !orphan_ids.contains(&tc.id));
            if copy.tool_calls.is_empty() && copy.content.len_chars() == 0 {
                continue;
            }
            out.push(copy);
        }

        if !removed.is_empty() {
            let note = format!(
                "<system-reminder>The following tool calls were removed from history because their \
                 results were lost: {}</system-reminder>",
                removed.join(", ")
            );
            self.attach_ephemeral(out.len().saturating_sub(1), note);
        }

        (out, removed)
    }

    /// Builds the message list to actually send to the provider: each ephemeral note is
    /// folded into the content of the message it's attached to, never mutating `messages`
    /// itself and never changing the list's length or the position of any other message.
    pub fn prepare_for_llm(&self, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .enumerate()
            .map(|(idx, msg)| match self.ephemeral.get(&idx) {
                Some(notes) => {
                    let mut copy = msg.clone();
                    for note in notes {
                        copy.content = fold_note_into(&copy.content, note);
                    }
                    copy
                }
                None => msg.clone(),
            })
            .collect()
    }
}
