//! The state of the world, rebuilt by every reduction.
//!
//! `StickyState` survives from one reduction to the next; everything else
//! is cleared when a reduction starts and must be re-contributed by the
//! reducers that own it (a linter that only returns its issues on its
//! primary action would make diagnostics flicker in the editor).
//!
//! All mutators are copy-on-write: they clone the state value, replace only
//! the touched field, and return the clone. Collections are `Arc`-backed,
//! so an untouched field keeps pointer identity across copies and no two
//! states can observe each other's writes.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use core_actions::ClientAction;

use crate::cmd::CmdCtx;
use crate::editor::{EditorConfig, EditorProps};
use crate::env::EnvMap;
use crate::issue::{Issue, IssueSet};
use crate::sets::StrSet;
use crate::view::View;

/// The fields that persist from one reduction to the next.
#[derive(Clone, Default)]
pub struct StickyState {
    pub view: Arc<View>,
    pub env: EnvMap,
    pub editor: EditorProps,
    pub config: Option<Arc<dyn EditorConfig>>,
}

impl fmt::Debug for StickyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StickyState")
            .field("view", &self.view.name)
            .field("env", &self.env.len())
            .field("editor", &self.editor.name)
            .field("config", &self.config.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct State {
    pub sticky: StickyState,

    /// Status fragments joined into the editor's status line.
    pub status: StrSet,
    /// User-facing errors; joined into the response `Error` field when the
    /// request produced nothing more specific.
    pub errors: StrSet,
    pub completions: Arc<Vec<Completion>>,
    pub issues: IssueSet,
    /// Builtin commands; populated during `RunCmd` reductions.
    pub builtin_cmds: BuiltinCmdList,
    /// User commands; populated during `QueryUserCmds` reductions.
    pub user_cmds: Arc<Vec<UserCmd>>,
    /// Client actions to hand to the editor with the next envelope.
    pub client_actions: Arc<Vec<ClientAction>>,
}

impl State {
    /// Fresh state sharing `sticky`, with every ephemeral field cleared.
    pub fn from_sticky(sticky: StickyState) -> State {
        State {
            sticky,
            ..State::default()
        }
    }

    /// Shallow copy with updates applied; the standard way to derive the
    /// next state inside a reducer.
    pub fn with(&self, f: impl FnOnce(&mut State)) -> State {
        let mut st = self.clone();
        f(&mut st);
        st
    }

    pub fn view(&self) -> &Arc<View> {
        &self.sticky.view
    }

    pub fn add_status<I, S>(&self, l: I) -> State
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let status = self.status.add(l);
        if status.same_as(&self.status) {
            return self.clone();
        }
        self.with(|st| st.status = status)
    }

    pub fn add_errors<I, S>(&self, l: I) -> State
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let errors = self.errors.add(l);
        if errors.same_as(&self.errors) {
            return self.clone();
        }
        self.with(|st| st.errors = errors)
    }

    pub fn set_config(&self, c: Arc<dyn EditorConfig>) -> State {
        self.with(|st| st.sticky.config = Some(c))
    }

    /// Replace the view's source; no-op on empty input, which is almost
    /// always a caller bug.
    pub fn set_src(&self, src: Vec<u8>) -> State {
        if src.is_empty() {
            return self.clone();
        }
        self.with(|st| st.sticky.view = Arc::new(st.sticky.view.set_src(src)))
    }

    pub fn add_completions<I: IntoIterator<Item = Completion>>(&self, l: I) -> State {
        let fresh: Vec<Completion> = l.into_iter().collect();
        if fresh.is_empty() {
            return self.clone();
        }
        self.with(|st| st.completions = append_arc(&st.completions, fresh))
    }

    pub fn add_issues<I: IntoIterator<Item = Issue>>(&self, l: I) -> State {
        let issues = self.issues.add(l);
        if issues.same_as(&self.issues) {
            return self.clone();
        }
        self.with(|st| st.issues = issues)
    }

    pub fn add_builtin_cmds<I: IntoIterator<Item = BuiltinCmd>>(&self, l: I) -> State {
        let fresh: Vec<BuiltinCmd> = l.into_iter().collect();
        if fresh.is_empty() {
            return self.clone();
        }
        self.with(|st| st.builtin_cmds = st.builtin_cmds.append(fresh))
    }

    pub fn add_user_cmds<I: IntoIterator<Item = UserCmd>>(&self, l: I) -> State {
        let fresh: Vec<UserCmd> = l.into_iter().collect();
        if fresh.is_empty() {
            return self.clone();
        }
        self.with(|st| st.user_cmds = append_arc(&st.user_cmds, fresh))
    }

    pub fn add_client_actions<I: IntoIterator<Item = ClientAction>>(&self, l: I) -> State {
        let fresh: Vec<ClientAction> = l.into_iter().collect();
        if fresh.is_empty() {
            return self.clone();
        }
        self.with(|st| st.client_actions = append_arc(&st.client_actions, fresh))
    }

    /// Wire form of this state. The view travels only when a reducer
    /// replaced its source; the editor already has the rest.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            view: if self.sticky.view.changed() > 0 {
                Some(Arc::clone(&self.sticky.view))
            } else {
                None
            },
            env: self.sticky.env.clone(),
            editor: self.sticky.editor.clone(),
            config: self
                .sticky
                .config
                .as_ref()
                .map(|c| c.editor_config())
                .unwrap_or(Value::Null),
            status: self.status.clone(),
            errors: self.errors.clone(),
            completions: Arc::clone(&self.completions),
            issues: self.issues.clone(),
            builtin_cmds: self.builtin_cmds.clone(),
            user_cmds: Arc::clone(&self.user_cmds),
            client_actions: Arc::clone(&self.client_actions),
        }
    }
}

fn append_arc<T: Clone>(xs: &Arc<Vec<T>>, fresh: Vec<T>) -> Arc<Vec<T>> {
    let mut next = Vec::with_capacity(xs.len() + fresh.len());
    next.extend(xs.iter().cloned());
    next.extend(fresh);
    Arc::new(next)
}

/// Serialized state carried in the response envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<Arc<View>>,
    pub env: EnvMap,
    pub editor: EditorProps,
    pub config: Value,
    pub status: StrSet,
    pub errors: StrSet,
    pub completions: Arc<Vec<Completion>>,
    pub issues: IssueSet,
    pub builtin_cmds: BuiltinCmdList,
    pub user_cmds: Arc<Vec<UserCmd>>,
    pub client_actions: Arc<Vec<ClientAction>>,
}

/// One completion candidate offered to the editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Completion {
    /// Text the editor matches the user's typing against.
    pub query: String,
    pub title: String,
    /// Snippet inserted on acceptance.
    pub src: String,
    pub tag: String,
}

/// A command surfaced in the editor's palette.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserCmd {
    pub title: String,
    pub name: String,
    pub args: Vec<String>,
    pub desc: String,
}

pub type BuiltinCmdRun = Arc<dyn Fn(&mut CmdCtx) + Send + Sync>;

/// A command runnable through the `RunCmd` action.
#[derive(Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuiltinCmd {
    pub name: String,
    pub desc: String,
    #[serde(skip)]
    pub run: BuiltinCmdRun,
}

impl BuiltinCmd {
    pub fn new(name: impl Into<String>, desc: impl Into<String>, run: BuiltinCmdRun) -> BuiltinCmd {
        BuiltinCmd {
            name: name.into(),
            desc: desc.into(),
            run,
        }
    }
}

impl fmt::Debug for BuiltinCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinCmd")
            .field("name", &self.name)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct BuiltinCmdList(Arc<Vec<BuiltinCmd>>);

impl BuiltinCmdList {
    /// Find a command by exact name.
    pub fn lookup(&self, name: &str) -> Option<BuiltinCmd> {
        self.0.iter().find(|c| c.name == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuiltinCmd> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn append(&self, fresh: Vec<BuiltinCmd>) -> BuiltinCmdList {
        BuiltinCmdList(append_arc(&self.0, fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_fields_keep_identity_across_mutations() {
        let st = State::default().add_status(["s1"]);
        let st2 = st.add_errors(["e1"]);
        assert!(st.status.same_as(&st2.status), "status untouched");
        assert!(!st.errors.same_as(&st2.errors), "errors replaced");
    }

    #[test]
    fn noop_mutators_return_an_identical_state() {
        let st = State::default().add_status(["s"]);
        let st2 = st.add_status(Vec::<String>::new());
        assert!(st.status.same_as(&st2.status));
        let st3 = st.add_issues(Vec::new());
        assert!(st.issues.same_as(&st3.issues));
    }

    #[test]
    fn from_sticky_clears_ephemerals() {
        let st = State::default()
            .add_status(["s"])
            .add_errors(["e"])
            .add_client_actions([ClientAction::restart()]);
        let fresh = State::from_sticky(st.sticky.clone());
        assert!(fresh.status.is_empty());
        assert!(fresh.errors.is_empty());
        assert!(fresh.client_actions.is_empty());
    }

    #[test]
    fn set_src_ignores_empty_input() {
        let st = State::default();
        let st2 = st.set_src(Vec::new());
        assert_eq!(st2.view().changed(), 0);
        let st3 = st.set_src(b"x".to_vec());
        assert_eq!(st3.view().changed(), 1);
    }

    #[test]
    fn snapshot_omits_unchanged_view() {
        let st = State::default();
        assert!(st.snapshot().view.is_none());
        let st = st.set_src(b"fmt'd".to_vec());
        let snap = st.snapshot();
        assert!(snap.view.is_some());
        let v = serde_json::to_value(&snap).expect("snapshot serializes");
        assert_eq!(
            v.get("View").and_then(|w| w.get("Src")),
            Some(&serde_json::json!("fmt'd"))
        );
    }

    #[test]
    fn builtin_cmd_lookup_finds_by_name() {
        let run: BuiltinCmdRun = Arc::new(|_cx: &mut CmdCtx| {});
        let st = State::default().add_builtin_cmds([
            BuiltinCmd::new(".kill", "cancel tasks", Arc::clone(&run)),
            BuiltinCmd::new(".vfs", "cache keys", run),
        ]);
        assert_eq!(st.builtin_cmds.len(), 2);
        assert!(st.builtin_cmds.lookup(".kill").is_some());
        assert!(st.builtin_cmds.lookup(".nope").is_none());
    }

    #[test]
    fn snapshot_serializes_empty_collections_as_present() {
        let v = serde_json::to_value(State::default().snapshot()).expect("serializes");
        assert_eq!(v.get("Status"), Some(&serde_json::json!([])));
        assert_eq!(v.get("Errors"), Some(&serde_json::json!([])));
        assert_eq!(v.get("Completions"), Some(&serde_json::json!([])));
        assert!(v.get("View").is_none());
    }
}
