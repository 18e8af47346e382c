//! Always-available builtin commands.
//!
//! `.env` prints the environment the agent would hand to spawned tools;
//! `.type` describes the commands currently in the builtin table. (`.kill`
//! and `.vfs` are contributed by the task tracker and cache reducers.)

use std::fmt::Write as _;
use std::sync::Arc;

use core_actions::Action;

use crate::cmd::CmdCtx;
use crate::ctx::Ctx;
use crate::reducer::Reducer;
use crate::state::{BuiltinCmd, State};

/// Before-band reducer seeding the builtin command table on `RunCmd`.
#[derive(Default)]
pub(crate) struct Builtins;

impl Reducer for Builtins {
    fn label(&self) -> &str {
        "builtins"
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        match mx.action {
            Action::RunCmd(_) => mx.state.add_builtin_cmds([
                BuiltinCmd::new(
                    ".env",
                    "Print the environment; name arguments filter by prefix",
                    Arc::new(env_cmd),
                ),
                BuiltinCmd::new(
                    ".type",
                    "Describe builtin commands; defaults to all of them",
                    Arc::new(type_cmd),
                ),
            ]),
            _ => mx.state.clone(),
        }
    }
}

fn env_cmd(cx: &mut CmdCtx) {
    let mut out = String::new();
    for (k, v) in cx.ctx.env().iter() {
        if !cx.args.is_empty() && !cx.args.iter().any(|a| k.starts_with(a.as_str())) {
            continue;
        }
        let _ = writeln!(out, "{k}={v}");
    }
    cx.output.write(out.as_bytes());
}

fn type_cmd(cx: &mut CmdCtx) {
    let mut out = String::new();
    for cmd in cx.ctx.state.builtin_cmds.iter() {
        if !cx.args.is_empty() && !cx.args.iter().any(|a| a == &cmd.name) {
            continue;
        }
        let _ = writeln!(out, "{}: {}", cmd.name, cmd.desc);
    }
    cx.output.write(out.as_bytes());
}
