//! Background task tracking: tickets, cancellation, and the animated
//! status line.
//!
//! A ticket lives from `begin` to `done`. Starting a task with a non-empty
//! cancel-id cancels any ticket already holding that id before `begin`
//! returns, giving named background jobs single-flight semantics.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use core_actions::Action;

use crate::cmd::CmdCtx;
use crate::ctx::Ctx;
use crate::reducer::Reducer;
use crate::state::{BuiltinCmd, State, UserCmd};
use crate::util::lock_unpoisoned;

type CancelFn = Arc<dyn Fn() + Send + Sync>;

/// Description of a background task.
#[derive(Default)]
pub struct Task {
    pub title: String,
    /// Non-empty: single-flight key; a new `begin` with the same id cancels
    /// the previous holder.
    pub cancel_id: String,
    /// Show the title in the status line immediately instead of after the
    /// usual one-second grace.
    pub show_now: bool,
    /// Cooperative cancellation hook; must be safe to call more than once.
    pub cancel: Option<CancelFn>,
}

/// Live handle for a started task.
#[derive(Clone)]
pub struct Ticket {
    pub id: String,
    pub cancel_id: String,
    pub title: String,
    pub start: Instant,
    show_now: bool,
    cancel: Option<CancelFn>,
    tracker: Weak<TaskTracker>,
}

impl Ticket {
    /// Mark the task finished. Idempotent; the tracker delivers each
    /// completion at most once.
    pub fn done(&self) {
        if let Some(tr) = self.tracker.upgrade() {
            tr.done(&self.id);
        }
    }

    /// Run the task's cancel hook, if it has one.
    pub fn cancel(&self) {
        if let Some(cancel) = &self.cancel {
            cancel();
        }
    }

    pub fn cancellable(&self) -> bool {
        self.cancel.is_some()
    }
}

#[derive(Default)]
struct TrackerInner {
    id: u64,
    tickets: Vec<Ticket>,
}

/// Shared ticket registry. The store owns one; reducers reach it through
/// their `Ctx`.
pub struct TaskTracker {
    inner: Mutex<TrackerInner>,
    self_weak: Weak<TaskTracker>,
}

impl TaskTracker {
    pub fn new() -> Arc<TaskTracker> {
        Arc::new_cyclic(|self_weak| TaskTracker {
            inner: Mutex::new(TrackerInner::default()),
            self_weak: self_weak.clone(),
        })
    }

    /// Start a task. Cancels any existing ticket with the same non-empty
    /// cancel-id before returning.
    pub fn begin(&self, task: Task) -> Ticket {
        let mut inner = lock_unpoisoned(&self.inner);
        if !task.cancel_id.is_empty() {
            for t in inner.tickets.iter().filter(|t| t.cancel_id == task.cancel_id) {
                t.cancel();
            }
        }
        inner.id += 1;
        let ticket = Ticket {
            id: format!("@{}", inner.id),
            cancel_id: task.cancel_id,
            title: task.title,
            start: Instant::now(),
            show_now: task.show_now,
            cancel: task.cancel,
            tracker: self.self_weak.clone(),
        };
        inner.tickets.push(ticket.clone());
        ticket
    }

    /// Cancel the ticket matching `tid` by id or cancel-id. Returns whether
    /// a cancellable ticket was found.
    pub fn cancel(&self, tid: &str) -> bool {
        let inner = lock_unpoisoned(&self.inner);
        for t in &inner.tickets {
            if t.id == tid || (!t.cancel_id.is_empty() && t.cancel_id == tid) {
                t.cancel();
                return t.cancellable();
            }
        }
        false
    }

    /// Cancel every outstanding ticket (unmount path).
    pub fn cancel_all(&self) {
        let inner = lock_unpoisoned(&self.inner);
        for t in &inner.tickets {
            t.cancel();
        }
    }

    pub fn has_tickets(&self) -> bool {
        !lock_unpoisoned(&self.inner).tickets.is_empty()
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        lock_unpoisoned(&self.inner).tickets.clone()
    }

    fn done(&self, id: &str) {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.tickets.retain(|t| t.id != id);
    }

    /// Render the status fragment: one age glyph per ticket plus the title
    /// of the first ticket old enough to be worth naming (1..=3s, or
    /// flagged show-now). Returns `None` when there is nothing to say.
    pub fn status(&self, now: Instant) -> Option<String> {
        let inner = lock_unpoisoned(&self.inner);
        let mut s = String::from("Tasks");
        let glyphs_start = s.len();
        let mut title = "";
        for t in &inner.tickets {
            let age = now.saturating_duration_since(t.start).as_secs();
            match age {
                0 => {}
                1 => s.push_str(" ◔"),
                2 => s.push_str(" ◑"),
                3 => s.push_str(" ◕"),
                _ => s.push_str(" ●"),
            }
            if title.is_empty() && !t.title.is_empty() && (age >= 1 || t.show_now) && age <= 3 {
                title = &t.title;
            }
        }
        if s.len() == glyphs_start && title.is_empty() {
            return None;
        }
        if !title.is_empty() {
            s.push(' ');
            s.push_str(title);
        }
        Some(s)
    }
}

/// After-band reducer: drives the 1 Hz tick while work is in flight,
/// contributes the status fragment, the `.kill` builtin, and per-ticket
/// user commands.
pub(crate) struct TaskStatus {
    tracker: Arc<TaskTracker>,
    ticker: Option<JoinHandle<()>>,
}

impl TaskStatus {
    pub(crate) fn new(tracker: Arc<TaskTracker>) -> TaskStatus {
        TaskStatus {
            tracker,
            ticker: None,
        }
    }

    fn kill_cmd(&self) -> BuiltinCmd {
        let tracker = Arc::clone(&self.tracker);
        BuiltinCmd::new(
            ".kill",
            "List and cancel active tasks",
            Arc::new(move |cx: &mut CmdCtx| {
                let mut out = String::new();
                if cx.args.is_empty() {
                    for t in tracker.tickets() {
                        let mut id = t.id.clone();
                        if !t.cancel_id.is_empty() {
                            id.push('|');
                            id.push_str(&t.cancel_id);
                        }
                        let dur = t.start.elapsed();
                        let dur = if dur < Duration::from_secs(1) {
                            format!("{}ms", dur.as_millis())
                        } else {
                            format!("{}s", dur.as_secs())
                        };
                        let _ = writeln!(out, "ID: {id}, Dur: {dur}, Title: {}", t.title);
                    }
                } else {
                    for tid in &cx.args {
                        let _ = writeln!(out, "{tid}: {}", tracker.cancel(tid));
                    }
                }
                cx.output.write(out.as_bytes());
            }),
        )
    }

    fn user_cmds(&self) -> Vec<UserCmd> {
        self.tracker
            .tickets()
            .into_iter()
            .map(|t| {
                let arg = if t.cancel_id.is_empty() {
                    t.id.clone()
                } else {
                    t.cancel_id.clone()
                };
                UserCmd {
                    title: format!("Cancel {}", t.title),
                    name: ".kill".to_string(),
                    args: vec![arg],
                    desc: String::new(),
                }
            })
            .collect()
    }
}

impl Reducer for TaskStatus {
    fn label(&self) -> &str {
        "tasks.status"
    }

    fn mount(&mut self, mx: &Ctx) {
        // Unit tests drive reductions without a runtime; they simply get no
        // ticker.
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = mx.store.clone();
        let tracker = Arc::clone(&self.tracker);
        let token = store.shutdown_token();
        self.ticker = Some(rt.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tracker.has_tickets() {
                            store.dispatch(Action::Tick);
                        }
                    }
                }
            }
        }));
    }

    fn unmount(&mut self, _mx: &Ctx) {
        self.tracker.cancel_all();
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        let mut st = match &mx.action {
            Action::RunCmd(_) => mx.state.add_builtin_cmds([self.kill_cmd()]),
            Action::QueryUserCmds => mx.state.add_user_cmds(self.user_cmds()),
            _ => mx.state.clone(),
        };
        if let Some(status) = self.tracker.status(Instant::now()) {
            st = st.add_status([status]);
        }
        st
    }
}
