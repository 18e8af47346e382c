//! Structured diagnostics and the reducers that keep them alive.
//!
//! Issues come from background producers (build runs, linters). A producer
//! dispatches its whole result set under a key; later sets replace earlier
//! ones for the same key, and the union is re-contributed on every
//! reduction so unrelated dispatches never make diagnostics flicker away.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use core_actions::{Action, CustomAction};

use crate::ctx::Ctx;
use crate::reducer::Reducer;
use crate::state::State;
use crate::view::View;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueTag {
    #[default]
    Error,
    Warning,
    Notice,
}

/// One diagnostic, anchored to a file position when the producer knows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Issue {
    pub path: String,
    pub name: String,
    /// Zero-based, matching view positions.
    pub row: usize,
    pub col: usize,
    pub end: usize,
    pub tag: IssueTag,
    /// Which producer reported it, e.g. `attache/rebuild`.
    pub label: String,
    pub message: String,
}

impl Issue {
    /// Whether the issue belongs to the given view (by path, falling back
    /// to the short name for path-less buffers).
    pub fn in_view(&self, v: &View) -> bool {
        if !self.path.is_empty() {
            return self.path == v.path;
        }
        !self.name.is_empty() && self.name == v.name
    }
}

/// De-duplicating issue list with the same copy-on-write contract as
/// [`crate::StrSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IssueSet(Arc<Vec<Issue>>);

impl IssueSet {
    pub fn add<I: IntoIterator<Item = Issue>>(&self, items: I) -> IssueSet {
        let mut fresh: Vec<Issue> = Vec::new();
        for it in items {
            if !self.0.contains(&it) && !fresh.contains(&it) {
                fresh.push(it);
            }
        }
        if fresh.is_empty() {
            return self.clone();
        }
        let mut next = Vec::with_capacity(self.0.len() + fresh.len());
        next.extend(self.0.iter().cloned());
        next.extend(fresh);
        IssueSet(Arc::new(next))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn same_as(&self, other: &IssueSet) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl FromIterator<Issue> for IssueSet {
    fn from_iter<I: IntoIterator<Item = Issue>>(iter: I) -> IssueSet {
        IssueSet::default().add(iter)
    }
}

/// Key under which a producer's issues are stored and replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IssueKey {
    pub label: String,
    pub path: String,
}

impl IssueKey {
    pub fn new(label: impl Into<String>, path: impl Into<String>) -> IssueKey {
        IssueKey {
            label: label.into(),
            path: path.into(),
        }
    }
}

/// Payload of the `StoreIssues` custom action dispatched by background
/// producers. An empty set clears the key.
#[derive(Debug, Clone)]
pub struct StoreIssues {
    pub key: IssueKey,
    pub issues: IssueSet,
}

impl StoreIssues {
    pub const ACTION: &'static str = "StoreIssues";

    /// Wrap into an action ready for `dispatch`.
    pub fn into_action(self) -> Action {
        Action::Custom(CustomAction::new(Self::ACTION, self))
    }
}

/// Before-band reducer holding keyed issue sets across reductions.
#[derive(Default)]
pub(crate) struct IssueStore {
    keyed: BTreeMap<IssueKey, IssueSet>,
}

impl Reducer for IssueStore {
    fn label(&self) -> &str {
        "issue.store"
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        if let Action::Custom(ca) = &mx.action {
            if let Some(si) = ca.data::<StoreIssues>() {
                if si.issues.is_empty() {
                    self.keyed.remove(&si.key);
                } else {
                    self.keyed.insert(si.key.clone(), si.issues.clone());
                }
            }
        }
        let mut st = mx.state.clone();
        for set in self.keyed.values() {
            st = st.add_issues(set.iter().cloned());
        }
        st
    }
}

/// After-band reducer folding surviving issues into the status line.
#[derive(Default)]
pub(crate) struct IssueStatus;

impl Reducer for IssueStatus {
    fn label(&self) -> &str {
        "issue.status"
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        let view = mx.view();
        let relevant = mx
            .state
            .issues
            .iter()
            .filter(|i| i.path.is_empty() && i.name.is_empty() || i.in_view(view))
            .count();
        if relevant == 0 {
            return mx.state.clone();
        }
        mx.state.add_status([format!("Issues ({relevant})")])
    }
}

/// Incremental parser turning tool output into issues.
///
/// Understands the two shapes rustc and friends emit: the two-line
/// `error[E0308]: message` / ` --> path:row:col` pair, and the single-line
/// `path:row:col: message` form common to most Unix tooling. Tool positions
/// are one-based; stored issues are zero-based like view positions.
pub struct IssueOut {
    base: Issue,
    dir: String,
    pending: Option<Issue>,
    issues: Vec<Issue>,
    carry: String,
    head_re: Regex,
    arrow_re: Regex,
    line_re: Regex,
}

impl IssueOut {
    pub fn new(label: impl Into<String>, dir: impl Into<String>) -> IssueOut {
        IssueOut {
            base: Issue {
                label: label.into(),
                ..Issue::default()
            },
            dir: dir.into(),
            pending: None,
            issues: Vec::new(),
            carry: String::new(),
            // error[E0308]: mismatched types / warning: unused import
            head_re: Regex::new(r"^(?P<tag>error|warning)(\[\w+\])?:\s*(?P<message>.+)$")
                .unwrap_or_else(|e| unreachable!("static pattern: {e}")),
            //   --> src/lib.rs:14:9
            arrow_re: Regex::new(r"^\s*-->\s*(?P<path>[^:]+):(?P<row>\d+):(?P<col>\d+)\s*$")
                .unwrap_or_else(|e| unreachable!("static pattern: {e}")),
            // src/lib.rs:14:9: message  (col optional)
            line_re: Regex::new(
                r"^(?P<path>[^:\s][^:]*):(?P<row>\d+)(?::(?P<col>\d+))?:\s*(?P<message>.+)$",
            )
            .unwrap_or_else(|e| unreachable!("static pattern: {e}")),
        }
    }

    pub fn write(&mut self, output: &[u8]) {
        self.carry.push_str(&String::from_utf8_lossy(output));
        while let Some(nl) = self.carry.find('\n') {
            let line: String = self.carry.drain(..=nl).collect();
            self.line(line.trim_end_matches('\n'));
        }
    }

    /// Flush any unterminated trailing line.
    pub fn flush(&mut self) {
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            self.line(&line);
        }
        if let Some(pending) = self.pending.take() {
            self.issues.push(pending);
        }
    }

    pub fn issues(&self) -> IssueSet {
        self.issues.iter().cloned().collect()
    }

    fn line(&mut self, line: &str) {
        if let Some(caps) = self.head_re.captures(line) {
            if let Some(pending) = self.pending.take() {
                self.issues.push(pending);
            }
            let mut issue = self.base.clone();
            issue.tag = match &caps["tag"] {
                "warning" => IssueTag::Warning,
                _ => IssueTag::Error,
            };
            issue.message = caps["message"].to_string();
            self.pending = Some(issue);
            return;
        }
        if let Some(caps) = self.arrow_re.captures(line) {
            if let Some(mut pending) = self.pending.take() {
                pending.path = self.abs_path(&caps["path"]);
                pending.row = one_based(&caps["row"]);
                pending.col = one_based(&caps["col"]);
                self.issues.push(pending);
            }
            return;
        }
        if let Some(caps) = self.line_re.captures(line) {
            let mut issue = self.base.clone();
            issue.path = self.abs_path(&caps["path"]);
            issue.row = one_based(&caps["row"]);
            issue.col = caps.name("col").map(|c| one_based(c.as_str())).unwrap_or(0);
            issue.message = caps["message"].to_string();
            self.issues.push(issue);
        }
    }

    fn abs_path(&self, path: &str) -> String {
        let p = Path::new(path);
        if p.is_absolute() || self.dir.is_empty() {
            return path.to_string();
        }
        Path::new(&self.dir).join(p).to_string_lossy().into_owned()
    }
}

fn one_based(s: &str) -> usize {
    s.parse::<usize>().unwrap_or(0).saturating_sub(1)
}
