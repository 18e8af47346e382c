//! Immutable snapshot of one editor buffer.
//!
//! The editor sends a view with every request; the store resolves its
//! source (in-memory → cache → disk), converts the editor's character
//! offsets to byte offsets, and stamps a content hash that scopes the KV
//! cache. Reducers that replace the source (`set_src`, e.g. a formatter)
//! get a new view whose bumped change counter makes it travel back to the
//! editor in the response.

use std::io;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use core_proto::ViewProps;

use crate::cache::KvCache;

const SRC_CACHE_KEY: &str = "view.src";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct View {
    pub path: String,
    pub wd: String,
    pub name: String,
    pub hash: String,
    #[serde(serialize_with = "ser_src")]
    pub src: Option<Arc<Vec<u8>>>,
    /// Caret as a byte offset into `src`.
    pub pos: usize,
    pub row: usize,
    pub col: usize,
    pub dirty: bool,
    pub ext: String,
    pub lang: String,

    #[serde(skip)]
    changed: u64,
}

fn ser_src<S: Serializer>(src: &Option<Arc<Vec<u8>>>, s: S) -> Result<S::Ok, S::Error> {
    match src {
        Some(b) => s.serialize_str(&String::from_utf8_lossy(b)),
        None => s.serialize_str(""),
    }
}

impl View {
    pub(crate) fn from_props(p: ViewProps) -> View {
        View {
            path: p.path,
            wd: p.wd,
            name: p.name,
            ext: p.ext,
            lang: p.lang,
            pos: p.pos,
            row: p.row,
            col: p.col,
            dirty: p.dirty,
            src: p.src.map(|s| Arc::new(s.into_bytes())),
            hash: String::new(),
            changed: 0,
        }
    }

    /// A view is usable once the editor has named it.
    pub fn valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// How many times a reducer replaced the source. Zero means the view is
    /// exactly what the editor sent and can be omitted from the response.
    pub fn changed(&self) -> u64 {
        self.changed
    }

    /// Directory the view's file lives in, or the working directory for
    /// path-less buffers.
    pub fn dir(&self) -> String {
        if !self.path.is_empty() {
            if let Some(parent) = Path::new(&self.path).parent() {
                return parent.to_string_lossy().into_owned();
            }
        }
        self.wd.clone()
    }

    pub fn filename(&self) -> String {
        if !self.path.is_empty() {
            return self.path.clone();
        }
        Path::new(&self.wd)
            .join(&self.name)
            .to_string_lossy()
            .into_owned()
    }

    /// True if any of `names` matches the language tag or the extension
    /// (without its dot).
    pub fn lang_is(&self, names: &[&str]) -> bool {
        names.iter().any(|n| {
            *n == self.lang || (!self.ext.is_empty() && self.ext.trim_start_matches('.') == *n)
        })
    }

    /// Resolve the view's contents: in-memory source first, then the
    /// view-scoped cache, then the file on disk (which also seeds the
    /// cache).
    pub fn read_all(&self, kvs: &KvCache) -> io::Result<Arc<Vec<u8>>> {
        if let Some(src) = &self.src {
            return Ok(Arc::clone(src));
        }
        if let Some(src) = kvs.get::<Vec<u8>>(SRC_CACHE_KEY) {
            return Ok(src);
        }
        if self.path.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "view has no path and no in-memory source",
            ));
        }
        let src = Arc::new(std::fs::read(&self.path)?);
        kvs.put(SRC_CACHE_KEY, (*src).clone());
        Ok(src)
    }

    /// Replace the source. Resets the caret, recomputes the hash, marks the
    /// view dirty and bumps the change counter.
    pub fn set_src(&self, src: Vec<u8>) -> View {
        let mut v = self.clone();
        v.hash = src_hash(&src);
        v.src = Some(Arc::new(src));
        v.pos = 0;
        v.row = 0;
        v.col = 0;
        v.dirty = true;
        v.changed += 1;
        v
    }

    /// Settle an editor-sent view: resolve the source eagerly when we can,
    /// convert the caret from characters to bytes, and stamp the hash.
    pub(crate) fn finalize(mut self, kvs: &KvCache) -> View {
        let src = match &self.src {
            Some(src) => Some(Arc::clone(src)),
            None if !self.path.is_empty() => std::fs::read(&self.path).ok().map(Arc::new),
            None => None,
        };
        if let Some(src) = src {
            self.pos = byte_pos(&src, self.pos);
            self.hash = src_hash(&src);
            self.src = Some(Arc::clone(&src));
            kvs.sync_view(&self.name, &self.hash);
            kvs.put(SRC_CACHE_KEY, (*src).clone());
        } else {
            kvs.sync_view(&self.name, &self.hash);
        }
        self
    }
}

/// Content hash in the form `hash:sha256;base64url,<digest>`.
pub fn src_hash(src: &[u8]) -> String {
    let digest = Sha256::digest(src);
    format!(
        "hash:sha256;base64url,{}",
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Convert a character offset (as editors count) into a byte offset,
/// clamped to the end of `src`. Continuation bytes of multi-byte sequences
/// are not counted.
pub fn byte_pos(src: &[u8], char_pos: usize) -> usize {
    let mut remaining = char_pos;
    for (i, b) in src.iter().enumerate() {
        // UTF-8 continuation bytes look like 0b10xxxxxx.
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        if remaining == 0 {
            return i;
        }
        remaining -= 1;
    }
    src.len()
}
