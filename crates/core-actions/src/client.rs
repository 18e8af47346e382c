//! Client actions: messages the agent pushes to the editor.
//!
//! They accumulate on the state during a reduction and ride out in the next
//! response (or unsolicited push) for the editor-side plugin to act on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::CmdOutput;

/// A named instruction for the editor, with an optional payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientAction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ClientAction {
    fn new<T: Serialize>(name: &str, data: T) -> ClientAction {
        ClientAction {
            name: name.to_string(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    /// Ask the editor to relaunch the agent.
    pub fn restart() -> ClientAction {
        ClientAction {
            name: "Restart".to_string(),
            data: Value::Null,
        }
    }

    /// Tell the editor the agent is going away for good.
    pub fn shutdown() -> ClientAction {
        ClientAction {
            name: "Shutdown".to_string(),
            data: Value::Null,
        }
    }

    /// Ask the editor to focus a file/position.
    pub fn activate(act: Activate) -> ClientAction {
        ClientAction::new("Activate", act)
    }

    /// Stream one chunk of command output under its fd.
    pub fn cmd_output(out: &CmdOutput) -> ClientAction {
        ClientAction::new("CmdOutput", out)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Activate {
    pub path: String,
    pub name: String,
    pub row: usize,
    pub col: usize,
}
