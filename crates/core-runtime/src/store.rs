//! The store: single owner of the current state and the reducer pipeline.
//!
//! All mutation is serialised through one work queue consumed by the agent
//! loop. Foreground requests and background dispatches share the queue, so
//! reducers observe a totally-ordered action stream, a request in progress
//! blocks dispatches until it completes, and committed states reach
//! listeners in commit order — the locking story is the queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use core_actions::{from_wire, Action};
use core_proto::Request;

use crate::builtins::Builtins;
use crate::cache::{CacheCmd, KvCache};
use crate::cmd::CmdRuntime;
use crate::ctx::Ctx;
use crate::editor::{EditorConfig, EditorProps};
use crate::env::EnvMap;
use crate::issue::{IssueStatus, IssueStore};
use crate::reducer::{Reducer, Slot};
use crate::restart::SelfRebuild;
use crate::state::State;
use crate::tasks::{Task, TaskStatus, TaskTracker, Ticket};
use crate::view::View;

/// One unit of serialised work.
#[derive(Debug)]
pub enum Work {
    /// A decoded request from the editor.
    Request(Box<Request>),
    /// A background dispatch.
    Dispatch(Action),
    /// stdin closed cleanly.
    Eof,
    /// The decode loop died; the message is terminal.
    Fatal(String),
}

/// Cloneable handle into the store, safe to hold from any thread. This is
/// what reducers hand to the workers they spawn.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<Work>,
    tracker: Arc<TaskTracker>,
    cache: Arc<KvCache>,
    shutdown: CancellationToken,
}

impl StoreHandle {
    /// Enqueue an action to run after all previously accepted work. Safe to
    /// call from inside a reduction; the action lands behind the current
    /// one.
    pub fn dispatch(&self, act: Action) {
        // A send failure means the agent loop is gone; the action can only
        // be dropped.
        let _ = self.tx.send(Work::Dispatch(act));
    }

    /// Start a tracked background task.
    pub fn begin(&self, task: Task) -> Ticket {
        self.tracker.begin(task)
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    pub fn cache(&self) -> &Arc<KvCache> {
        &self.cache
    }

    /// Token cancelled when the store unmounts.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn send_work(&self, work: Work) {
        let _ = self.tx.send(work);
    }
}

/// Result of a foreground request.
pub struct SyncOutcome {
    pub state: State,
    /// Empty on success.
    pub error: String,
}

type Listener = Arc<dyn Fn(&State) + Send + Sync>;

pub struct Store {
    state: State,
    before: Vec<Slot>,
    using: Vec<Slot>,
    after: Vec<Slot>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
    /// Receives every state committed by a background dispatch; the agent
    /// pushes these to the editor unsolicited.
    push: Option<Box<dyn FnMut(&State) + Send>>,
    cfg: Option<Box<dyn Fn() -> Arc<dyn EditorConfig> + Send>>,
    handle: StoreHandle,
    unmounted: bool,
}

impl Store {
    /// Create a store plus the receiving end of its work queue. The caller
    /// (normally the agent loop) owns the receiver and feeds
    /// [`Store::sync_request`] / [`Store::dispatch_now`] from it.
    pub fn new() -> (Store, mpsc::UnboundedReceiver<Work>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = StoreHandle {
            tx,
            tracker: TaskTracker::new(),
            cache: Arc::new(KvCache::new()),
            shutdown: CancellationToken::new(),
        };
        let mut state = State::default();
        state.sticky.env = EnvMap::process();
        let store = Store {
            state,
            before: Vec::new(),
            using: Vec::new(),
            after: Vec::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            push: None,
            cfg: None,
            handle,
            unmounted: false,
        };
        (store, rx)
    }

    /// Install the built-in reducers in their home bands.
    pub fn install_default_reducers(&mut self) {
        self.before(IssueStore::default());
        self.before(Builtins::default());
        self.before(CacheCmd::default());
        self.after(IssueStatus::default());
        self.after(TaskStatus::new(Arc::clone(&self.handle.tracker)));
        self.after(CmdRuntime::default());
        self.after(SelfRebuild::new());
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Add a reducer to the before band (runs ahead of user reducers).
    pub fn before(&mut self, r: impl Reducer + 'static) -> &mut Store {
        self.before.push(Slot::new(Box::new(r)));
        self
    }

    /// Add a user reducer (the middle band).
    pub fn using(&mut self, r: impl Reducer + 'static) -> &mut Store {
        self.using.push(Slot::new(Box::new(r)));
        self
    }

    /// Add a reducer to the after band (runs behind user reducers).
    pub fn after(&mut self, r: impl Reducer + 'static) -> &mut Store {
        self.after.push(Slot::new(Box::new(r)));
        self
    }

    /// Register the editor configuration producer; it is re-read into every
    /// prepped state.
    pub fn editor_config(
        &mut self,
        f: impl Fn() -> Arc<dyn EditorConfig> + Send + 'static,
    ) -> &mut Store {
        self.cfg = Some(Box::new(f));
        self
    }

    /// Subscribe to every committed state, in commit order. Returns an id
    /// for [`Store::unsubscribe`]. Callbacks run on the reduction thread
    /// and must not block.
    pub fn subscribe(&mut self, l: impl Fn(&State) + Send + Sync + 'static) -> u64 {
        self.next_listener_id += 1;
        self.listeners.push((self.next_listener_id, Arc::new(l)));
        self.next_listener_id
    }

    pub fn unsubscribe(&mut self, id: u64) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub(crate) fn set_push(&mut self, push: Box<dyn FnMut(&State) + Send>) {
        self.push = Some(push);
    }

    /// The zeroth reduction: runs the pipeline once with `Init` so reducers
    /// can set themselves up. Not pushed to the editor.
    pub fn boot(&mut self) {
        let st = self.prep_state();
        let st = self.reduce(Action::Init, st);
        self.commit(st);
    }

    /// Foreground entry point: one decoded request, one reduction, one
    /// response. Action construction failures produce an error outcome with
    /// the state unchanged.
    pub fn sync_request(&mut self, rq: Request) -> SyncOutcome {
        let act = match from_wire(&rq.action.name, rq.action.data.as_ref()) {
            Ok(act) => act,
            Err(e) => {
                tracing::warn!(target: "store", action = %rq.action.name, error = %e, "request rejected");
                return SyncOutcome {
                    state: self.state.clone(),
                    error: e.to_string(),
                };
            }
        };

        let mut st = self.prep_state();
        st = self.overlay_props(st, rq.props);
        let st = self.reduce(act, st);
        self.commit(st.clone());
        SyncOutcome {
            state: st,
            error: String::new(),
        }
    }

    /// Background entry point: reduce an already-constructed action and
    /// push the committed state to the editor.
    pub fn dispatch_now(&mut self, act: Action) -> State {
        let st = self.prep_state();
        let st = self.reduce(act, st);
        self.commit(st.clone());
        if let Some(push) = self.push.as_mut() {
            push(&st);
        }
        st
    }

    /// Run the final `Unmount` reduction exactly once and cancel every
    /// background token.
    pub fn unmount(&mut self) {
        if self.unmounted {
            return;
        }
        self.unmounted = true;
        let st = self.prep_state();
        let st = self.reduce(Action::Unmount, st);
        self.commit(st);
        self.handle.shutdown.cancel();
    }

    /// Fresh state for a reduction: sticky carried over, ephemerals
    /// cleared, registered editor config applied.
    fn prep_state(&self) -> State {
        let mut st = State::from_sticky(self.state.sticky.clone());
        if let Some(cfg) = &self.cfg {
            st.sticky.config = Some(cfg());
        }
        st
    }

    /// Overlay the request's client properties onto a prepped state.
    fn overlay_props(&self, mut st: State, props: core_proto::ClientProps) -> State {
        st.sticky.editor = EditorProps::from_props(props.editor);
        if !props.env.is_empty() {
            st.sticky.env = props.env.into_iter().collect();
        }
        if let Some(vp) = props.view {
            let view = View::from_props(vp).finalize(&self.handle.cache);
            if view.valid() {
                st.sticky.view = Arc::new(view);
            }
        }
        st
    }

    /// One traversal of the pipeline: before → use → after, in order, with
    /// the per-reduction cancellation token cancelled on the way out.
    fn reduce(&mut self, act: Action, st: State) -> State {
        let done = self.handle.shutdown.child_token();
        let mut mx = Ctx::new(st, act, self.handle.clone(), done.clone());
        for slot in self
            .before
            .iter_mut()
            .chain(self.using.iter_mut())
            .chain(self.after.iter_mut())
        {
            let st = slot.apply(&mx);
            mx = mx.with_state(st);
        }
        done.cancel();
        mx.state
    }

    /// Publish a state and notify subscribers in registration order. The
    /// listener list is snapshotted first, so a callback that mutates
    /// subscriptions sees its change on the next commit.
    fn commit(&mut self, st: State) {
        self.state = st;
        let listeners: Vec<Listener> = self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for l in listeners {
            l(&self.state);
        }
    }
}
