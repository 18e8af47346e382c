//! Per-reduction context handed to every reducer.
//!
//! A `Ctx` is cheap to clone (every field is a handle), which is how it
//! moves into worker threads. The token behind `done()` is cancelled the
//! moment the reduction returns — a worker that outlives the reduction must
//! take a [`Ctx::background`] copy instead, whose token lives until the
//! store shuts down.

use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use core_actions::Action;

use crate::env::EnvMap;
use crate::state::State;
use crate::store::StoreHandle;
use crate::tasks::{Task, Ticket};
use crate::view::View;

#[derive(Clone)]
pub struct Ctx {
    /// The current state of the world.
    pub state: State,
    /// The action being reduced.
    pub action: Action,
    /// Handle back into the store: dispatch, tasks, cache.
    pub store: StoreHandle,

    done: CancellationToken,
}

impl Ctx {
    pub(crate) fn new(
        state: State,
        action: Action,
        store: StoreHandle,
        done: CancellationToken,
    ) -> Ctx {
        Ctx {
            state,
            action,
            store,
            done,
        }
    }

    pub fn view(&self) -> &Arc<View> {
        self.state.view()
    }

    pub fn env(&self) -> &EnvMap {
        &self.state.sticky.env
    }

    pub fn lang_is(&self, names: &[&str]) -> bool {
        self.state.sticky.view.lang_is(names)
    }

    /// Token cancelled when this reduction finishes (or, for background
    /// copies, when the store shuts down).
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Copy of this context for work that outlives the reduction. Its token
    /// is independent of the reduction and is cancelled on store shutdown.
    pub fn background(&self) -> Ctx {
        Ctx {
            state: self.state.clone(),
            action: self.action.clone(),
            store: self.store.clone(),
            done: self.store.shutdown_token().child_token(),
        }
    }

    /// Enqueue an action behind all previously accepted work.
    pub fn dispatch(&self, act: Action) {
        self.store.dispatch(act);
    }

    /// Start a tracked background task.
    pub fn begin(&self, task: Task) -> Ticket {
        self.store.begin(task)
    }

    /// Resolve the current view's contents through the store cache.
    pub fn read_view(&self) -> io::Result<Arc<Vec<u8>>> {
        self.state.sticky.view.read_all(self.store.cache())
    }

    pub(crate) fn with_state(&self, state: State) -> Ctx {
        Ctx {
            state,
            action: self.action.clone(),
            store: self.store.clone(),
            done: self.done.clone(),
        }
    }
}
