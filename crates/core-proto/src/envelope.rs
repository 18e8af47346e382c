//! Request and response envelopes.
//!
//! Wire field names are PascalCase. Nested payloads that the framing layer
//! does not interpret (action data, editor settings) ride along as dynamic
//! values; whoever owns the payload decodes it further.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One request from the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Request {
    /// Opaque correlation id, echoed back in the matching response.
    pub cookie: String,
    pub action: ActionDescriptor,
    pub props: ClientProps,
}

/// Names the action to dispatch, with an optional codec-decoded payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ActionDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Everything the editor tells us about itself and the active buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ClientProps {
    pub editor: EditorProps,
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewProps>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct EditorProps {
    pub name: String,
    pub version: String,
    /// Editor-internal settings blob; interpreted by whichever reducer asks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

/// Snapshot of one editor buffer as sent by the client.
///
/// `pos`/`row`/`col` are character offsets as editors count them; the agent
/// converts to byte offsets once the source is resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ViewProps {
    pub path: String,
    pub wd: String,
    pub name: String,
    pub ext: String,
    pub lang: String,
    pub pos: usize,
    pub row: usize,
    pub col: usize,
    pub dirty: bool,
    /// In-memory buffer contents, present when the view is dirty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

/// One response (or unsolicited push, when `cookie` is empty) to the editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response<S> {
    pub cookie: String,
    /// Empty on success; human-readable otherwise.
    pub error: String,
    pub state: S,
}
