//! Fixed table mapping wire action names to action values.
//!
//! Query-style actions carry no payload and construct as zero values;
//! `RunCmd`, `QueryTooltips` and `Cancel` decode theirs from the envelope's
//! dynamic data field. Unknown names are a per-request error, never fatal.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::action::Action;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown client action: {0}")]
    Unknown(String),

    #[error("decoding {name} payload: {source}")]
    Payload {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Construct an action from its wire descriptor.
pub fn from_wire(name: &str, data: Option<&Value>) -> Result<Action, ActionError> {
    let act = match name {
        "Started" => Action::Started,
        "Shutdown" => Action::Shutdown,
        "Restart" => Action::Restart,
        "ViewActivated" => Action::ViewActivated,
        "ViewModified" => Action::ViewModified,
        "ViewPosChanged" => Action::ViewPosChanged,
        "ViewFmt" => Action::ViewFmt,
        "ViewPreSave" => Action::ViewPreSave,
        "ViewSaved" => Action::ViewSaved,
        "ViewLoaded" => Action::ViewLoaded,
        "QueryCompletions" => Action::QueryCompletions,
        "QueryIssues" => Action::QueryIssues,
        "QueryUserCmds" => Action::QueryUserCmds,
        "QueryTooltips" => Action::QueryTooltips(payload(name, data)?),
        "RunCmd" => Action::RunCmd(payload(name, data)?),
        "Cancel" => Action::Cancel(payload(name, data)?),
        _ => return Err(ActionError::Unknown(name.to_string())),
    };
    Ok(act)
}

fn payload<T: DeserializeOwned + Default>(
    name: &str,
    data: Option<&Value>,
) -> Result<T, ActionError> {
    match data {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|source| ActionError::Payload {
            name: name.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, RunCmd};
    use serde_json::json;

    #[test]
    fn zero_value_actions_construct_without_payload() {
        for name in [
            "Started",
            "Shutdown",
            "Restart",
            "ViewActivated",
            "ViewModified",
            "ViewPosChanged",
            "ViewFmt",
            "ViewPreSave",
            "ViewSaved",
            "ViewLoaded",
            "QueryCompletions",
            "QueryIssues",
            "QueryUserCmds",
        ] {
            let act = from_wire(name, None).expect("registered action");
            assert_eq!(act.name(), name);
        }
    }

    #[test]
    fn run_cmd_decodes_its_payload() {
        let act = from_wire(
            "RunCmd",
            Some(&json!({"Name": ".echo", "Args": ["hi"], "Fd": "f1"})),
        )
        .expect("payload decodes");
        match act {
            Action::RunCmd(RunCmd {
                name, args, fd, ..
            }) => {
                assert_eq!(name, ".echo");
                assert_eq!(args, vec!["hi".to_string()]);
                assert_eq!(fd, "f1");
            }
            other => panic!("expected RunCmd, got {other:?}"),
        }
    }

    #[test]
    fn tooltips_default_when_payload_absent() {
        let act = from_wire("QueryTooltips", None).expect("defaults");
        match act {
            Action::QueryTooltips(q) => {
                assert_eq!((q.row, q.col), (0, 0));
            }
            other => panic!("expected QueryTooltips, got {other:?}"),
        }
    }

    #[test]
    fn unknown_name_is_reported_verbatim() {
        let err = from_wire("Nope", None).expect_err("unknown action");
        assert_eq!(err.to_string(), "unknown client action: Nope");
    }

    #[test]
    fn malformed_payload_is_a_payload_error() {
        let err = from_wire("RunCmd", Some(&json!({"Args": 5}))).expect_err("bad payload");
        assert!(matches!(err, ActionError::Payload { .. }));
        assert!(err.to_string().contains("RunCmd"));
    }

    #[test]
    fn internal_sentinels_are_not_wire_constructible() {
        for name in ["Init", "Unmount", "Tick", "Render", "CmdOutput"] {
            assert!(from_wire(name, None).is_err(), "{name} must stay internal");
        }
    }
}
