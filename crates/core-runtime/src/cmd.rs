//! Built-in command runtime.
//!
//! A `RunCmd` action is routed to the builtin table the reducers ahead of
//! this one contributed during the same reduction. The command body runs on
//! a background task so the reduction returns promptly; everything it
//! writes is framed as `CmdOutput` client actions under the request's fd,
//! with a final `Close` emitted exactly once. Cancellation reaches a
//! running command through `.kill` (its tracker ticket) or the editor's
//! `Cancel{fd}` action.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use core_actions::{Action, ClientAction, CmdOutput, RunCmd};

use crate::ctx::Ctx;
use crate::reducer::Reducer;
use crate::state::State;
use crate::store::StoreHandle;
use crate::tasks::Task;

/// Streams a command's output back to the editor as client actions.
pub struct CmdOutputWriter {
    fd: String,
    store: StoreHandle,
    closed: AtomicBool,
}

impl CmdOutputWriter {
    pub fn new(fd: impl Into<String>, store: StoreHandle) -> CmdOutputWriter {
        CmdOutputWriter {
            fd: fd.into(),
            store,
            closed: AtomicBool::new(false),
        }
    }

    pub fn fd(&self) -> &str {
        &self.fd
    }

    /// Frame one chunk. Writes after close are dropped.
    pub fn write(&self, output: &[u8]) {
        if output.is_empty() || self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.store.dispatch(Action::CmdOutput(CmdOutput {
            fd: self.fd.clone(),
            output: String::from_utf8_lossy(output).into_owned(),
            close: false,
        }));
    }

    pub fn write_str(&self, s: &str) {
        self.write(s.as_bytes());
    }

    /// Emit the end-of-stream marker. Only the first call does anything.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.store.dispatch(Action::CmdOutput(CmdOutput {
            fd: self.fd.clone(),
            output: String::new(),
            close: true,
        }));
    }
}

/// Everything a command body gets to work with.
pub struct CmdCtx {
    /// Background context: its token is the command's cancellation signal.
    pub ctx: Ctx,
    pub name: String,
    pub args: Vec<String>,
    /// The request's input stream (the view contents when `Input` was set).
    pub input: Box<dyn Read + Send>,
    pub output: Arc<CmdOutputWriter>,
}

/// After-band reducer that dispatches `RunCmd`, fans command output out to
/// the editor, and serves `Cancel{fd}`.
#[derive(Default)]
pub(crate) struct CmdRuntime {
    running: HashMap<String, CancellationToken>,
}

impl Reducer for CmdRuntime {
    fn label(&self) -> &str {
        "cmd.runtime"
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        match &mx.action {
            Action::RunCmd(rc) => self.run_cmd(mx, rc.clone()),
            Action::CmdOutput(out) => {
                if out.close {
                    self.running.remove(&out.fd);
                }
                mx.state.add_client_actions([ClientAction::cmd_output(out)])
            }
            Action::Cancel(c) => {
                if let Some(token) = self.running.get(&c.fd) {
                    tracing::info!(target: "cmd", fd = %c.fd, "cancelled by editor");
                    token.cancel();
                }
                mx.state.clone()
            }
            _ => mx.state.clone(),
        }
    }
}

impl CmdRuntime {
    fn run_cmd(&mut self, mx: &Ctx, rc: RunCmd) -> State {
        let writer = Arc::new(CmdOutputWriter::new(rc.fd.clone(), mx.store.clone()));

        let Some(cmd) = mx.state.builtin_cmds.lookup(&rc.name) else {
            writer.write_str(&format!("unknown command {}\n", rc.name));
            writer.close();
            return mx.state.add_errors([format!("error: unknown command {}", rc.name)]);
        };

        let mut st = mx.state.clone();
        let input: Vec<u8> = if rc.input {
            match mx.read_view() {
                Ok(src) => (*src).clone(),
                Err(e) => {
                    st = st.add_errors([format!("{}: reading view: {e}", rc.name)]);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let token = mx.store.shutdown_token().child_token();
        if !rc.fd.is_empty() {
            self.running.insert(rc.fd.clone(), token.clone());
        }

        let cancel = token.clone();
        let ticket = mx.store.begin(Task {
            title: format!("{} {}", rc.name, rc.args.join(" ")).trim().to_string(),
            cancel: Some(Arc::new(move || cancel.cancel())),
            ..Task::default()
        });

        let mut cx = CmdCtx {
            ctx: Ctx::new(st.clone(), mx.action.clone(), mx.store.clone(), token),
            name: rc.name.clone(),
            args: rc.args.clone(),
            input: Box::new(Cursor::new(input)),
            output: Arc::clone(&writer),
        };
        let mut job = move || {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (cmd.run)(&mut cx))) {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(target: "cmd", cmd = %cx.name, panic = %msg, "command panicked");
            }
            cx.output.close();
            ticket.done();
        };

        // Inline fallback keeps the runtime usable from plain sync tests.
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn_blocking(job);
            }
            Err(_) => job(),
        }

        st
    }
}
