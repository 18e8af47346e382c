//! The agent runtime: copy-on-write state, the ordered reducer pipeline,
//! the serialised store, the task tracker, the built-in command runtime and
//! the stdio agent loop that ties them to the wire protocol.
//!
//! Layering, leaves first: `sets`/`env`/`issue`/`view`/`editor` are plain
//! data; `state` assembles them; `cache`, `ctx`, `reducer` and `store` form
//! the dispatch machinery; `tasks`, `cmd`, `builtins`, `restart`,
//! `completions` are the built-in reducers; `agent` owns the process
//! boundary.

mod agent;
mod builtins;
mod cache;
mod cmd;
mod completions;
mod ctx;
mod editor;
mod env;
mod issue;
mod reducer;
mod restart;
mod sets;
mod state;
mod store;
mod tasks;
mod util;
mod view;

pub use agent::{Agent, AgentConfig};
pub use cache::KvCache;
pub use cmd::{CmdCtx, CmdOutputWriter};
pub use completions::{time_limited, TimeLimited, COMPLETION_BUDGET};
pub use ctx::Ctx;
pub use editor::{EditorConfig, EditorProps, SettingsError};
pub use env::EnvMap;
pub use issue::{Issue, IssueKey, IssueOut, IssueSet, IssueTag, StoreIssues};
pub use reducer::{reduce_fn, ReduceFn, Reducer};
pub use restart::SelfRebuild;
pub use sets::StrSet;
pub use state::{
    BuiltinCmd, BuiltinCmdList, BuiltinCmdRun, Completion, State, StateSnapshot, StickyState,
    UserCmd,
};
pub use store::{Store, StoreHandle, SyncOutcome, Work};
pub use tasks::{Task, TaskTracker, Ticket};
pub use view::{byte_pos, src_hash, View};
