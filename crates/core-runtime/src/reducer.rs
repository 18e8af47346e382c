//! The reducer contract and per-slot lifecycle bookkeeping.
//!
//! A reducer folds `(state, action)` into the next state. Most implementors
//! override only [`Reducer::reduce`]; the lifecycle hooks default to no-ops
//! so a reducer opts into exactly the ceremony it needs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::ctx::Ctx;
use crate::editor::EditorConfig;
use crate::state::State;

/// A node in the pipeline.
///
/// Hooks fire in this order for each reducer on each reduction: `init`
/// (first traversal of the boot `Init` action), `configure`, `cond`,
/// `mount` (first traversal that passes `cond`), `unmount` (on the final
/// `Unmount` action), `reduce`.
///
/// `reduce` must return quickly — slow work blocks the editor. Kick long
/// work onto a task holding a [`Ctx::background`] copy and report back with
/// a dispatch.
pub trait Reducer: Send {
    /// Name used in logs and profiles.
    fn label(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// One-time setup during the boot reduction.
    fn init(&mut self, _mx: &Ctx) {}

    /// Contribute editor configuration; a `Some` is spliced into the
    /// in-flight state before the remaining hooks run.
    fn configure(&mut self, _mx: &Ctx) -> Option<Arc<dyn EditorConfig>> {
        None
    }

    /// Gate for this reduction; `false` skips mount/reduce.
    fn cond(&self, _mx: &Ctx) -> bool {
        true
    }

    /// First reduction this reducer participates in.
    fn mount(&mut self, _mx: &Ctx) {}

    /// Final reduction; release anything `mount` acquired.
    fn unmount(&mut self, _mx: &Ctx) {}

    fn reduce(&mut self, mx: &Ctx) -> State;
}

/// Wrap a plain function as a reducer.
pub struct ReduceFn {
    label: String,
    f: Box<dyn FnMut(&Ctx) -> State + Send>,
}

/// Convenience constructor for [`ReduceFn`].
pub fn reduce_fn(
    label: impl Into<String>,
    f: impl FnMut(&Ctx) -> State + Send + 'static,
) -> ReduceFn {
    ReduceFn {
        label: label.into(),
        f: Box::new(f),
    }
}

impl Reducer for ReduceFn {
    fn label(&self) -> &str {
        &self.label
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        (self.f)(mx)
    }
}

/// A reducer plus the flags the pipeline tracks for it.
pub(crate) struct Slot {
    r: Box<dyn Reducer>,
    inited: bool,
    mounted: bool,
}

impl Slot {
    pub(crate) fn new(r: Box<dyn Reducer>) -> Slot {
        Slot {
            r,
            inited: false,
            mounted: false,
        }
    }

    pub(crate) fn label(&self) -> &str {
        self.r.label()
    }

    /// Drive one reducer through its lifecycle for one reduction, with the
    /// panic firewall. A panicking step is logged and skipped; the input
    /// state flows through unchanged.
    pub(crate) fn apply(&mut self, mx: &Ctx) -> State {
        let label = self.r.label().to_string();
        match catch_unwind(AssertUnwindSafe(|| self.step(mx))) {
            Ok(st) => st,
            Err(payload) => {
                tracing::error!(
                    target: "store.reduce",
                    reducer = %label,
                    panic = %panic_message(&payload),
                    "reducer panicked; step skipped"
                );
                mx.state.clone()
            }
        }
    }

    fn step(&mut self, mx: &Ctx) -> State {
        use core_actions::Action;

        if matches!(mx.action, Action::Init) && !self.inited {
            self.inited = true;
            self.r.init(mx);
        }

        let spliced;
        let mx = match self.r.configure(mx) {
            Some(cfg) => {
                spliced = mx.with_state(mx.state.set_config(cfg));
                &spliced
            }
            None => mx,
        };

        if !self.r.cond(mx) {
            return mx.state.clone();
        }

        if !self.mounted {
            self.mounted = true;
            self.r.mount(mx);
        }

        if matches!(mx.action, Action::Unmount) {
            self.r.unmount(mx);
            self.mounted = false;
            return mx.state.clone();
        }

        self.r.reduce(mx)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
