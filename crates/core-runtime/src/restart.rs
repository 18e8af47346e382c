//! Restart-on-self-change.
//!
//! When a file inside the agent's own source tree is saved, a background
//! build runs under a ticket. A clean build dispatches `Restart`, which this
//! same reducer turns into the `Restart` client action so the editor-side
//! plugin relaunches the agent; a failed build becomes issues that stick
//! around until a later build clears them. `Shutdown` is forwarded to the
//! editor the same way.

use std::path::Path;

use core_actions::{Action, ClientAction, CustomAction};

use crate::ctx::Ctx;
use crate::issue::{Issue, IssueOut, IssueSet};
use crate::reducer::Reducer;
use crate::state::State;
use crate::tasks::Task;

const REBUILD_LABEL: &str = "attache/rebuild";
const REBUILD_DONE: &str = "SelfRebuildDone";

#[derive(Debug, Clone)]
struct BuildRes {
    issues: IssueSet,
}

/// After-band reducer watching saves of the agent's own sources.
pub struct SelfRebuild {
    issues: IssueSet,
    /// Build command: program plus arguments.
    build: Vec<String>,
    /// Path segment identifying the agent's own tree.
    marker: String,
}

impl SelfRebuild {
    pub fn new() -> SelfRebuild {
        SelfRebuild::with_build(
            ["cargo".to_string(), "build".to_string()].to_vec(),
            "attache",
        )
    }

    /// Custom build command and tree marker; how tests drive this reducer.
    pub fn with_build(build: Vec<String>, marker: impl Into<String>) -> SelfRebuild {
        SelfRebuild {
            issues: IssueSet::default(),
            build,
            marker: marker.into(),
        }
    }

    fn own_source(&self, path: &str) -> bool {
        if !path.ends_with(".rs") {
            return false;
        }
        Path::new(path)
            .components()
            .any(|c| c.as_os_str() == self.marker.as_str())
    }

    fn try_rebuild(&self, mx: &Ctx) {
        let view = mx.view();
        if !self.own_source(&view.path) {
            return;
        }
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(target: "restart", "no runtime; rebuild skipped");
            return;
        };

        let store = mx.store.clone();
        let env = mx.env().environ();
        let dir = view.dir();
        let filename = view.filename();
        let build = self.build.clone();

        rt.spawn(async move {
            let (prog, args) = match build.split_first() {
                Some(split) => split,
                None => return,
            };
            let ticket = store.begin(Task {
                title: "rebuilding agent".to_string(),
                ..Task::default()
            });
            let result = tokio::process::Command::new(prog)
                .args(args)
                .current_dir(&dir)
                .envs(env)
                .output()
                .await;

            match result {
                Ok(out) => {
                    let mut iw = IssueOut::new(REBUILD_LABEL, &dir);
                    iw.write(&out.stderr);
                    iw.write(&out.stdout);
                    iw.flush();
                    let issues = iw.issues();
                    if out.status.success() && issues.is_empty() {
                        tracing::info!(
                            target: "restart",
                            file = %filename,
                            "rebuilt after save; asking the editor to relaunch"
                        );
                        store.dispatch(Action::Restart);
                    } else {
                        tracing::warn!(
                            target: "restart",
                            file = %filename,
                            status = %out.status,
                            issues = issues.len(),
                            "rebuild failed"
                        );
                        store.dispatch(Action::Custom(CustomAction::new(
                            REBUILD_DONE,
                            BuildRes { issues },
                        )));
                    }
                }
                Err(e) => {
                    tracing::error!(target: "restart", error = %e, "rebuild did not run");
                    let issues = [Issue {
                        label: REBUILD_LABEL.to_string(),
                        message: format!("build failed to start: {e}"),
                        ..Issue::default()
                    }]
                    .into_iter()
                    .collect();
                    store.dispatch(Action::Custom(CustomAction::new(
                        REBUILD_DONE,
                        BuildRes { issues },
                    )));
                }
            }
            ticket.done();
        });
    }
}

impl Default for SelfRebuild {
    fn default() -> SelfRebuild {
        SelfRebuild::new()
    }
}

impl Reducer for SelfRebuild {
    fn label(&self) -> &str {
        "restart.rebuild"
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        let mut st = mx.state.clone();
        match &mx.action {
            Action::ViewSaved => self.try_rebuild(mx),
            Action::Restart => {
                tracing::info!(target: "restart", "Restart dispatched");
                st = st.add_client_actions([ClientAction::restart()]);
            }
            Action::Shutdown => {
                tracing::info!(target: "restart", "Shutdown dispatched");
                st = st.add_client_actions([ClientAction::shutdown()]);
            }
            Action::Custom(ca) => {
                if let Some(res) = ca.data::<BuildRes>() {
                    self.issues = res.issues.clone();
                }
            }
            _ => {}
        }
        st.add_issues(self.issues.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn own_source_requires_marker_and_rs_extension() {
        let r = SelfRebuild::with_build(vec!["true".to_string()], "attache");
        assert!(r.own_source("/w/attache/crates/core-runtime/src/store.rs"));
        assert!(!r.own_source("/w/other/src/store.rs"));
        assert!(!r.own_source("/w/attache/README.md"));
        assert!(!r.own_source("/w/attachement/src/lib.rs"), "whole segment only");
    }

    #[test]
    fn restart_action_becomes_a_client_action() {
        let (mut store, _rx) = Store::new();
        store.after(SelfRebuild::with_build(vec!["true".to_string()], "attache"));
        let st = store.dispatch_now(Action::Restart);
        assert!(st.client_actions.iter().any(|a| a.name == "Restart"));
    }

    #[test]
    fn shutdown_action_becomes_a_client_action() {
        let (mut store, _rx) = Store::new();
        store.after(SelfRebuild::with_build(vec!["true".to_string()], "attache"));
        let st = store.dispatch_now(Action::Shutdown);
        assert!(st.client_actions.iter().any(|a| a.name == "Shutdown"));
    }

    #[test]
    fn build_results_persist_across_unrelated_reductions() {
        let (mut store, _rx) = Store::new();
        store.after(SelfRebuild::with_build(vec!["true".to_string()], "attache"));
        let issues: IssueSet = [Issue {
            label: REBUILD_LABEL.to_string(),
            message: "boom".to_string(),
            ..Issue::default()
        }]
        .into_iter()
        .collect();
        store.dispatch_now(Action::Custom(CustomAction::new(
            REBUILD_DONE,
            BuildRes { issues },
        )));
        for _ in 0..3 {
            let st = store.dispatch_now(Action::ViewPosChanged);
            assert_eq!(st.issues.len(), 1);
        }
        // A clean rebuild clears them.
        store.dispatch_now(Action::Custom(CustomAction::new(
            REBUILD_DONE,
            BuildRes {
                issues: IssueSet::default(),
            },
        )));
        let st = store.dispatch_now(Action::ViewPosChanged);
        assert!(st.issues.is_empty());
    }
}
