//! The action universe.
//!
//! An action is a hint that something happened; reducers match on it and
//! fold it into the next state. Wire actions arrive from the editor through
//! the registry; the internal sentinels (`Init`, `Unmount`, `Tick`,
//! `Render`) are only ever dispatched in-process. `Custom` lets a reducer
//! carry its own background results through the store without widening this
//! enum.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Top-level action enum consumed by the reducer pipeline.
#[derive(Debug, Clone, Default)]
pub enum Action {
    /// The zero action: forces a re-reduction without semantic change.
    #[default]
    Render,
    /// First reduction after boot; triggers reducer `init` hooks.
    Init,
    /// Final reduction before exit; triggers reducer `unmount` hooks.
    Unmount,
    /// Periodic tick from the task tracker while work is in flight.
    Tick,

    Started,
    Shutdown,
    Restart,

    ViewActivated,
    ViewModified,
    ViewPosChanged,
    ViewFmt,
    ViewPreSave,
    ViewSaved,
    ViewLoaded,

    QueryCompletions,
    QueryIssues,
    QueryUserCmds,
    QueryTooltips(QueryTooltips),

    RunCmd(RunCmd),
    /// Editor-initiated cancellation of a running command's output channel.
    Cancel(CancelCmd),
    /// A running command produced output; fanned out to the editor as a
    /// `CmdOutput` client action.
    CmdOutput(CmdOutput),

    /// Reducer-defined action, typically a background worker's result.
    Custom(CustomAction),
}

impl Action {
    /// Stable name used by the wire codec and in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Render => "Render",
            Action::Init => "Init",
            Action::Unmount => "Unmount",
            Action::Tick => "Tick",
            Action::Started => "Started",
            Action::Shutdown => "Shutdown",
            Action::Restart => "Restart",
            Action::ViewActivated => "ViewActivated",
            Action::ViewModified => "ViewModified",
            Action::ViewPosChanged => "ViewPosChanged",
            Action::ViewFmt => "ViewFmt",
            Action::ViewPreSave => "ViewPreSave",
            Action::ViewSaved => "ViewSaved",
            Action::ViewLoaded => "ViewLoaded",
            Action::QueryCompletions => "QueryCompletions",
            Action::QueryIssues => "QueryIssues",
            Action::QueryUserCmds => "QueryUserCmds",
            Action::QueryTooltips(_) => "QueryTooltips",
            Action::RunCmd(_) => "RunCmd",
            Action::Cancel(_) => "Cancel",
            Action::CmdOutput(_) => "CmdOutput",
            Action::Custom(ca) => ca.name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct QueryTooltips {
    pub row: usize,
    pub col: usize,
}

/// Run a built-in (or reducer-contributed) command.
///
/// `fd` is the editor-chosen handle the command's output is streamed under;
/// `input` asks for the current view's contents on the command's stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RunCmd {
    pub name: String,
    pub args: Vec<String>,
    pub fd: String,
    pub input: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CancelCmd {
    pub fd: String,
}

/// One chunk of command output, or the end-of-stream marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CmdOutput {
    pub fd: String,
    pub output: String,
    pub close: bool,
}

/// A reducer-private action. The payload is opaque to everyone except the
/// reducer that knows the concrete type behind it.
#[derive(Clone)]
pub struct CustomAction {
    pub name: &'static str,
    data: Arc<dyn Any + Send + Sync>,
}

impl CustomAction {
    pub fn new<T: Any + Send + Sync>(name: &'static str, data: T) -> CustomAction {
        CustomAction {
            name,
            data: Arc::new(data),
        }
    }

    /// Recover the payload if it is of type `T`.
    pub fn data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
