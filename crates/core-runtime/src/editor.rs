//! Editor metadata and the editor-facing configuration seam.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Data about the editor driving this agent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EditorProps {
    pub name: String,
    pub version: String,
    #[serde(skip)]
    settings: Option<Arc<Value>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// The editor sent no settings block.
    #[error("no editor settings")]
    NoSettings,

    #[error("decoding editor settings: {0}")]
    Decode(String),
}

impl EditorProps {
    pub(crate) fn from_props(p: core_proto::EditorProps) -> EditorProps {
        EditorProps {
            name: p.name,
            version: p.version,
            settings: p.settings.map(Arc::new),
        }
    }

    /// Decode the editor-internal settings blob into `T`.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, SettingsError> {
        let raw = self.settings.as_ref().ok_or(SettingsError::NoSettings)?;
        serde_json::from_value((**raw).clone()).map_err(|e| SettingsError::Decode(e.to_string()))
    }
}

/// The common interface between internally supported editors.
///
/// A reducer's `configure` hook may return one of these to splice new
/// configuration into the in-flight state; `editor_config` renders the blob
/// the editor receives with every response.
pub trait EditorConfig: Send + Sync {
    /// Data to be sent to the editor.
    fn editor_config(&self) -> Value;

    /// Languages for which the editor should dispatch actions. `*` means
    /// all languages, and is the default.
    fn enabled_for_langs(&self) -> Vec<String> {
        vec!["*".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct FmtSettings {
        fmt_on_save: bool,
    }

    #[test]
    fn settings_decode_into_caller_type() {
        let ep = EditorProps::from_props(core_proto::EditorProps {
            name: "ed".to_string(),
            version: "1".to_string(),
            settings: Some(json!({"fmt_on_save": true})),
        });
        let s: FmtSettings = ep.settings().expect("settings decode");
        assert!(s.fmt_on_save);
    }

    #[test]
    fn missing_settings_is_its_own_error() {
        let ep = EditorProps::default();
        let err = ep.settings::<FmtSettings>().expect_err("no settings");
        assert_eq!(err, SettingsError::NoSettings);
    }
}
