//! Completion query budget.
//!
//! Completion queries sit on the editor's critical path, so a completion
//! reducer is wrapped in [`TimeLimited`]: on `QueryCompletions` the inner
//! reducer races a budget on a scratch thread, and a blown budget yields
//! the input state — an empty completion list, no error. Every other action
//! passes through inline.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use core_actions::Action;

use crate::ctx::Ctx;
use crate::editor::EditorConfig;
use crate::reducer::Reducer;
use crate::state::State;
use crate::util::lock_unpoisoned;

/// Default budget for a completion query.
pub const COMPLETION_BUDGET: Duration = Duration::from_millis(250);

pub struct TimeLimited<R> {
    inner: Arc<Mutex<R>>,
    budget: Duration,
    label: String,
}

/// Wrap a completion reducer with the default budget.
pub fn time_limited<R: Reducer>(inner: R) -> TimeLimited<R> {
    TimeLimited::new(inner, COMPLETION_BUDGET)
}

impl<R: Reducer> TimeLimited<R> {
    pub fn new(inner: R, budget: Duration) -> TimeLimited<R> {
        let label = format!("time-limited({})", inner.label());
        TimeLimited {
            inner: Arc::new(Mutex::new(inner)),
            budget,
            label,
        }
    }
}

impl<R: Reducer + 'static> Reducer for TimeLimited<R> {
    fn label(&self) -> &str {
        &self.label
    }

    fn init(&mut self, mx: &Ctx) {
        lock_unpoisoned(&self.inner).init(mx);
    }

    fn configure(&mut self, mx: &Ctx) -> Option<Arc<dyn EditorConfig>> {
        lock_unpoisoned(&self.inner).configure(mx)
    }

    fn cond(&self, mx: &Ctx) -> bool {
        lock_unpoisoned(&self.inner).cond(mx)
    }

    fn mount(&mut self, mx: &Ctx) {
        lock_unpoisoned(&self.inner).mount(mx);
    }

    fn unmount(&mut self, mx: &Ctx) {
        lock_unpoisoned(&self.inner).unmount(mx);
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        if !matches!(mx.action, Action::QueryCompletions) {
            return lock_unpoisoned(&self.inner).reduce(mx);
        }

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let mx2 = mx.clone();
        std::thread::spawn(move || {
            let st = lock_unpoisoned(&inner).reduce(&mx2);
            // The receiver is gone if the budget expired; nothing to do.
            let _ = tx.send(st);
        });

        match rx.recv_timeout(self.budget) {
            Ok(st) => st,
            Err(_) => {
                tracing::warn!(
                    target: "store.reduce",
                    reducer = %self.label,
                    budget_ms = self.budget.as_millis() as u64,
                    "completion query over budget; returning partial state"
                );
                mx.state.clone()
            }
        }
    }
}
