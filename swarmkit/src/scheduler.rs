//! Cooperative scheduler glue.
//!
//! Scheduler-local storage is implemented with `tokio::task_local!`: values set before a task
//! spawns its children are visible to those children without being threaded through every
//! call site.
//! `barrier` wraps a set of child tasks with a wall-clock timeout and a `CancellationToken`
//! so that firing the timeout reaches every child at its next suspension point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use swarm_event::{Event, EventStream, Identity};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

tokio::task_local! {
    static IDENTITY: Identity;
    static EVENTS: EventStream;
    static CANCEL: CancellationToken;
}

/// Runs `fut` with the given scheduler-local identity, event stream, and cancellation token
/// installed. Any task spawned with `tokio::spawn` *from inside* `fut` does NOT automatically
/// inherit task-locals (a `tokio` limitation for `'static` spawned tasks) -- call sites that
/// spawn children must capture `current_identity()`/`current_events()`/`current_cancel()`
/// before spawning and re-enter scope with `with_scope` inside the spawned task -- the
/// capture-and-reenter pattern is the one supported way to spawn from within a scope and
/// still have the child inherit it.
pub async fn with_scope<F, T>(identity: Identity, events: EventStream, cancel: CancellationToken, fut: F) -> T
where
    F: Future<Output = T>,
{
    IDENTITY
        .scope(identity, EVENTS.scope(events, CANCEL.scope(cancel, fut)))
        .await
}

/// Falls back to a detached identity when called outside any `with_scope` -- e.g. a unit
/// test driving an `AgentInstance` directly without going through `SwarmOrchestrator`.
pub fn current_identity() -> Identity {
    IDENTITY
        .try_with(|i| i.clone())
        .unwrap_or_else(|_| Identity::new("exec_detached", "detached"))
}

/// Falls back to a fresh, subscriber-less stream outside any scope, so `emit` is always
/// safe to call (events simply go nowhere rather than panicking the caller).
pub fn current_events() -> EventStream {
    EVENTS.try_with(|e| e.clone()).unwrap_or_else(EventStream::new)
}

pub fn current_cancel() -> CancellationToken {
    CANCEL.try_with(|c| c.clone()).unwrap_or_else(CancellationToken::new)
}

/// Whether the calling task is already running inside a `with_scope`. A swarm execution
/// started from within another scope (a workflow node's mini-swarm, nested inside the
/// workflow's own top-level `execute`) uses this to inherit the parent's `execution_id` and
/// event stream instead of allocating a fresh one, per spec.md §4.1's identity-inheritance
/// requirement -- only the outermost `execute` gets a brand new execution identity.
pub fn in_scope() -> bool {
    IDENTITY.try_with(|_| ()).is_ok()
}

/// Emits an event on the current scope's stream, filling identity fields automatically.
/// Non-blocking: the caller never awaits subscriber delivery beyond the emit call itself.
pub async fn emit(kind: swarm_event::EventKind, agent: Option<String>) {
    let identity = current_identity();
    let events = current_events();
    events.emit(Event::new(kind, &identity, agent)).await;
}

/// Outcome of a barrier-with-timeout run.
pub enum BarrierOutcome<T> {
    Completed(T),
    TimedOut,
}

/// Runs `fut` under a wall-clock timeout; on timeout, cancels `cancel` so every child task
/// cooperating with it (by checking `cancel.cancelled()` at suspension points, or by being
/// raced against `cancel.cancelled()`) unwinds. `finally` runs in both outcomes, so cleanup
/// still happens on timeout.
///
/// `execution_timeout` wraps a whole `execute()` call; `turn_timeout` wraps a single `ask()`.
pub async fn barrier_with_timeout<F, Fut, T, C, CFut>(
    duration: Duration,
    cancel: CancellationToken,
    fut: F,
    finally: C,
) -> BarrierOutcome<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = ()>,
{
    let timed_out;
    let value = tokio::select! {
        biased;
        out = tokio::time::timeout(duration, fut()) => {
            match out {
                Ok(v) => {
                    timed_out = false;
                    Some(v)
                }
                Err(_) => {
                    timed_out = true;
                    None
                }
            }
        }
        _ = cancel.cancelled() => {
            timed_out = true;
            None
        }
    };
    finally().await;
    match value {
        Some(value) if !timed_out => BarrierOutcome::Completed(value),
        _ => {
            cancel.cancel();
            BarrierOutcome::TimedOut
        }
    }
}

/// A join-set of child tasks all cancelled together when `cancel` fires. Used by tool fan-out
/// and delegation fan-out.
pub struct ChildBarrier<T> {
    pub set: JoinSet<T>,
    pub cancel: CancellationToken,
}

impl<T: Send + 'static> ChildBarrier<T> {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            set: JoinSet::new(),
            cancel,
        }
    }

    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.set.spawn(fut);
    }

    /// Aborts every still-running child. Used on cancellation/timeout so no background task
    /// from the execution is still running when an external `wait()` returns.
    pub fn abort_all(&mut self) {
        self.set.abort_all();
    }

    /// Collects all results, returning `None` in place of any task that was aborted/panicked
    /// rather than failing the whole join.
    pub async fn join_all(mut self) -> Vec<Option<T>> {
        let mut out = Vec::new();
        while let Some(res) = self.set.join_next().await {
            out.push(res.ok());
        }
        out
    }
}

/// Allocates a new execution id: `exec_<swarm_id>_<rand>`.
pub fn new_execution_id(swarm_id: &str) -> String {
    format!("exec_{swarm_id}_{}", uuid::Uuid::new_v4().simple())
}

pub fn shared_events() -> Arc<EventStream> {
    Arc::new(current_events())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_event::EventKind;

    #[tokio::test]
    async fn emit_outside_any_scope_does_not_panic() {
        // An `AgentInstance` driven directly in a unit test, with no `SwarmOrchestrator`
        // around it, has never entered `with_scope`. `emit` must still be safe to call.
        emit(EventKind::SwarmStart, None).await;
        assert_eq!(current_identity().execution_id, "exec_detached");
    }

    #[tokio::test]
    async fn in_scope_reflects_whether_a_scope_is_active() {
        assert!(!in_scope());
        let identity = Identity::new("exec_1", "swarm_a");
        with_scope(identity, EventStream::new(), CancellationToken::new(), async {
            assert!(in_scope());
        })
        .await;
        assert!(!in_scope());
    }

    #[tokio::test]
    async fn scope_makes_identity_and_events_available() {
        let identity = Identity::new("exec_1", "swarm_a");
        let events = EventStream::new();
        let cancel = CancellationToken::new();
        with_scope(identity.clone(), events.clone(), cancel, async {
            assert_eq!(current_identity().execution_id, "exec_1");
            emit(EventKind::SwarmStart, None).await;
        })
        .await;
        let history = events.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].execution_id, "exec_1");
    }

    #[tokio::test]
    async fn barrier_times_out_and_cancels() {
        let cancel = CancellationToken::new();
        let cancel_for_run = cancel.clone();
        let outcome = barrier_with_timeout(
            Duration::from_millis(10),
            cancel_for_run,
            || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "never"
            },
            || async {},
        )
        .await;
        assert!(matches!(outcome, BarrierOutcome::TimedOut));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn barrier_completes_before_timeout() {
        let cancel = CancellationToken::new();
        let outcome = barrier_with_timeout(
            Duration::from_secs(5),
            cancel,
            || async { 42 },
            || async {},
        )
        .await;
        match outcome {
            BarrierOutcome::Completed(v) => assert_eq!(v, 42),
            BarrierOutcome::TimedOut => panic!("should not time out"),
        }
    }

    #[tokio::test]
    async fn child_barrier_abort_all_stops_pending_tasks() {
        let cancel = CancellationToken::new();
        let mut barrier: ChildBarrier<u32> = ChildBarrier::new(cancel);
        barrier.spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            1
        });
        barrier.abort_all();
        let results = barrier.join_all().await;
        assert_eq!(results, vec![None]);
    }
}
