//! Hook registry and execution.
//!
//! Hooks are matched by event kind and, for tool-related events, an optional tool-name
//! matcher. Handlers run in priority order (descending; ties broken by registration order)
//! and the first one to return a short-circuiting action wins; every handler after that one
//! does not run.

pub mod shell;

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::error::HookHaltError;

/// Points in the engine's lifecycle a hook can bind to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookEventKind {
    SwarmStart,
    SwarmStop,
    PreToolUse,
    PostToolUse,
    UserPrompt,
    AgentStop,
    FirstMessage,
    PreDelegation,
    PostDelegation,
    ContextWarning,
}

/// Matches a tool name against a hook binding.
#[derive(Clone, Debug)]
pub enum Matcher {
    /// No matcher: applies to every tool (or every event, for non-tool hook kinds).
    Any,
    /// Exact tool name equality.
    Literal(String),
    /// `Bash|Read|Write`-style alternation, compiled to an anchored regex.
    Pattern(Arc<Regex>),
}

impl Matcher {
    /// Builds a matcher from a raw pattern string. A plain name with no `|` is a literal
    /// match; anything containing `|` is compiled as an anchored alternation.
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        if raw.is_empty() || raw == "*" {
            return Ok(Matcher::Any);
        }
        if raw.contains('|') {
            let anchored = format!("^({raw})$");
            return Ok(Matcher::Pattern(Arc::new(Regex::new(&anchored)?)));
        }
        Ok(Matcher::Literal(raw.to_string()))
    }

    pub fn matches(&self, tool_name: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Literal(name) => name == tool_name,
            Matcher::Pattern(re) => re.is_match(tool_name),
        }
    }
}

/// Context passed to a hook handler: everything it is allowed to observe or veto.
#[derive(Clone, Debug)]
pub struct HookContext {
    pub agent_name: String,
    pub tool_name: Option<String>,
    pub tool_arguments: Option<Value>,
    pub prompt: Option<String>,
    pub payload: Value,
}

/// Outcome of a hook handler. `Continue` lets the chain proceed; every other variant
/// short-circuits the remaining chain and the engine action it triggers.
#[derive(Clone, Debug)]
pub enum HookAction {
    Continue,
    /// Abort the entire turn/execution with a user-facing message.
    Halt(String),
    /// Replace the item under inspection (tool arguments, prompt, content) with this value.
    Replace(Value),
    /// Re-issue the request to the LLM with this additional instruction appended.
    Reprompt(String),
    /// Stop the current agent but let the swarm continue (if anything else is running).
    FinishAgent(String),
    /// Stop the whole swarm execution immediately.
    FinishSwarm(String),
}

#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, ctx: &HookContext) -> HookAction;
}

/// A hook handler wrapping an async closure, for programmatic registration (as opposed to
/// `ShellHook`, which shells out).
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&HookContext) -> HookAction + Send + Sync,
{
    async fn call(&self, ctx: &HookContext) -> HookAction {
        (self.0)(ctx)
    }
}

struct Binding {
    matcher: Matcher,
    priority: i32,
    seq: u64,
    hook: Arc<dyn Hook>,
}

/// Registry of hook bindings, keyed by lifecycle event. Registration order is preserved so
/// that same-priority bindings run in the order they were added.
#[derive(Default)]
pub struct HookRegistry {
    bindings: std::collections::HashMap<HookEventKind, Vec<Binding>>,
    next_seq: u64,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        event: HookEventKind,
        matcher: Matcher,
        priority: i32,
        hook: Arc<dyn Hook>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.bindings.entry(event).or_default().push(Binding {
            matcher,
            priority,
            seq,
            hook,
        });
    }

    /// Runs every binding for `event` whose matcher accepts `ctx.tool_name` (or all bindings,
    /// for non-tool events), highest priority first, stopping at the first non-`Continue`
    /// action. Returns `Ok(Continue)` if every handler continued.
    pub async fn run(&self, event: HookEventKind, ctx: &HookContext) -> Result<HookAction, HookHaltError> {
        let mut bindings: Vec<&Binding> = self
            .bindings
            .get(&event)
            .into_iter()
            .flatten()
            .filter(|b| match &ctx.tool_name {
                Some(name) => b.matcher.matches(name),
                None => true,
            })
            .collect();
        bindings.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));

        for binding in bindings {
            match binding.hook.call(ctx).await {
                HookAction::Continue => continue,
                HookAction::Halt(msg) => return Err(HookHaltError(msg)),
                other => return Ok(other),
            }
        }
        Ok(HookAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(tool: Option<&str>) -> HookContext {
        HookContext {
            agent_name: "lead".into(),
            tool_name: tool.map(String::from),
            tool_arguments: None,
            prompt: None,
            payload: Value::Null,
        }
    }

    #[test]
    fn matcher_pattern_is_anchored() {
        let m = Matcher::parse("Bash|Read").unwrap();
        assert!(m.matches("Bash"));
        assert!(m.matches("Read"));
        assert!(!m.matches("BashExtra"));
        assert!(!m.matches("Write"));
    }

    #[tokio::test]
    async fn highest_priority_wins_and_short_circuits() {
        let mut reg = HookRegistry::new();
        reg.register(
            HookEventKind::PreToolUse,
            Matcher::Any,
            0,
            Arc::new(FnHook(|_: &HookContext| HookAction::Continue)),
        );
        reg.register(
            HookEventKind::PreToolUse,
            Matcher::Any,
            10,
            Arc::new(FnHook(|_: &HookContext| HookAction::Halt("blocked".into()))),
        );
        let err = reg
            .run(HookEventKind::PreToolUse, &ctx(Some("Bash")))
            .await
            .unwrap_err();
        assert_eq!(err.0, "blocked");
    }

    #[tokio::test]
    async fn non_matching_tool_is_skipped() {
        let mut reg = HookRegistry::new();
        reg.register(
            HookEventKind::PreToolUse,
            Matcher::Literal("Write".into()),
            0,
            Arc::new(FnHook(|_: &HookContext| HookAction::Halt("nope".into()))),
        );
        let result = reg
            .run(HookEventKind::PreToolUse, &ctx(Some("Read")))
            .await
            .unwrap();
        assert!(matches!(result, HookAction::Continue));
    }

    #[tokio::test]
    async fn same_priority_runs_in_registration_order() {
        let mut reg = HookRegistry::new();
        reg.register(
            HookEventKind::PreToolUse,
            Matcher::Any,
            0,
            Arc::new(FnHook(|_: &HookContext| HookAction::Reprompt("first".into()))),
        );
        reg.register(
            HookEventKind::PreToolUse,
            Matcher::Any,
            0,
            Arc::new(FnHook(|_: &HookContext| HookAction::Reprompt("second".into()))),
        );
        let result = reg
            .run(HookEventKind::PreToolUse, &ctx(Some("Bash")))
            .await
            .unwrap();
        match result {
            HookAction::Reprompt(msg) => assert_eq!(msg, "first"),
            _ => panic!("expected Reprompt"),
        }
    }
}
