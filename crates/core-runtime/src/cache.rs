//! Store-owned key-value cache, scoped to the active view.
//!
//! Reducers memoise per-view work here (resolved source, parsed files,
//! package metadata). Entries are only valid for the view they were computed
//! against: whenever the active view's name or content hash changes, the
//! whole cache is dropped. Values are type-erased; readers downcast.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use core_actions::{Action, RunCmd};

use crate::cmd::CmdCtx;
use crate::ctx::Ctx;
use crate::reducer::Reducer;
use crate::state::{BuiltinCmd, State};
use crate::util::lock_unpoisoned;

type Entry = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct CacheInner {
    /// (view name, content hash) the entries were computed against.
    scope: (String, String),
    entries: HashMap<String, Entry>,
}

#[derive(Default)]
pub struct KvCache {
    inner: Mutex<CacheInner>,
}

impl KvCache {
    pub fn new() -> KvCache {
        KvCache::default()
    }

    /// Fetch an entry if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let inner = lock_unpoisoned(&self.inner);
        inner
            .entries
            .get(key)
            .cloned()
            .and_then(|e| e.downcast::<T>().ok())
    }

    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.entries.insert(key.into(), Arc::new(value));
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted keys plus the current scope, for introspection.
    pub fn describe(&self) -> (String, String, Vec<String>) {
        let inner = lock_unpoisoned(&self.inner);
        let mut keys: Vec<String> = inner.entries.keys().cloned().collect();
        keys.sort();
        (inner.scope.0.clone(), inner.scope.1.clone(), keys)
    }

    /// Re-scope the cache to a view. A change of name or hash invalidates
    /// every entry.
    pub(crate) fn sync_view(&self, name: &str, hash: &str) {
        let mut inner = lock_unpoisoned(&self.inner);
        if inner.scope.0 != name || inner.scope.1 != hash {
            inner.scope = (name.to_string(), hash.to_string());
            inner.entries.clear();
        }
    }
}

/// Before-band reducer contributing the `.vfs` builtin: prints the cache
/// scope and keys so a user can see what the agent is holding onto.
#[derive(Default)]
pub(crate) struct CacheCmd;

impl Reducer for CacheCmd {
    fn label(&self) -> &str {
        "cache.vfs"
    }

    fn reduce(&mut self, mx: &Ctx) -> State {
        match mx.action {
            Action::RunCmd(RunCmd { .. }) => mx.state.add_builtin_cmds([BuiltinCmd::new(
                ".vfs",
                "Print the keys cached for the current view",
                Arc::new(vfs_cmd),
            )]),
            _ => mx.state.clone(),
        }
    }
}

fn vfs_cmd(cx: &mut CmdCtx) {
    let (name, hash, keys) = cx.ctx.store.cache().describe();
    let mut out = String::new();
    if name.is_empty() {
        out.push_str("no view scope\n");
    } else {
        out.push_str(&format!("view: {name}\nhash: {hash}\n"));
    }
    for key in &keys {
        if !cx.args.is_empty() && !cx.args.iter().any(|a| key.starts_with(a.as_str())) {
            continue;
        }
        out.push_str(key);
        out.push('\n');
    }
    cx.output.write(out.as_bytes());
}
