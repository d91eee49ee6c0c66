//! Command scripts
//!
//! A script is a JSON array of commands in wire form, minus `commandId`:
//!
//! ```json
//! [
//!   { "type": "addPrimitive", "primType": "box", "name": "A" },
//!   { "type": "addPrimitive", "primType": "sphere", "name": "B", "position": [0.5, 0, 0] },
//!   { "type": "performBoolean", "op": "subtract", "targetId": "@0", "toolId": "@1" },
//!   { "type": "exportScene", "format": "stl" }
//! ]
//! ```
//!
//! A string `"@N"` anywhere in a step stands for the object id returned by
//! step `N`. Advisory commands are sent fire-and-forget. A failing step is
//! reported and the script carries on.

use crate::error::{ScriptError, SessionError};
use crate::session::Session;
use scenelink_gateway::GatewayError;
use scenelink_protocol::{AdvisoryCommand, ObjectId, SandboxCommand};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Parsed script
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    steps: Vec<Value>,
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step: usize,
    pub command_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    fn failed(step: usize, command_type: impl Into<String>, error: impl ToString) -> Self {
        Self {
            step,
            command_type: command_type.into(),
            success: false,
            object_id: None,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let steps: Vec<Value> =
            serde_json::from_str(text).map_err(|e| ScriptError::Parse(e.to_string()))?;
        Ok(Self { steps })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ScriptError::Parse(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order against `session`
    ///
    /// Only a closed session aborts the run.
    pub async fn run(&self, session: &Session) -> Result<Vec<StepReport>, SessionError> {
        let mut reports: Vec<StepReport> = Vec::with_capacity(self.steps.len());

        for (step, raw) in self.steps.iter().enumerate() {
            let claimed_type = raw
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned();

            let command = match resolve(step, raw.clone(), &reports).and_then(|v| parse(step, v)) {
                Ok(command) => command,
                Err(err) => {
                    reports.push(StepReport::failed(step, claimed_type, err));
                    continue;
                }
            };
            let command_type = command.command_type();
            tracing::debug!(step, command_type, "running script step");

            let report = match AdvisoryCommand::try_from(command) {
                Ok(advisory) => match session.send_fire_and_forget(advisory).await {
                    Ok(()) => StepReport {
                        step,
                        command_type: command_type.to_owned(),
                        success: true,
                        object_id: None,
                        data: None,
                        error: None,
                    },
                    Err(SessionError::Gateway(GatewayError::Destroyed)) => {
                        return Err(SessionError::Closed)
                    }
                    Err(err) => StepReport::failed(step, command_type, err),
                },
                Err(command) => match session.send(command).await {
                    Ok(result) => StepReport {
                        step,
                        command_type: command_type.to_owned(),
                        success: true,
                        object_id: result.object_id(),
                        data: result.data,
                        error: None,
                    },
                    Err(SessionError::Gateway(GatewayError::Destroyed)) => {
                        return Err(SessionError::Closed)
                    }
                    Err(err) => StepReport::failed(step, command_type, err),
                },
            };
            reports.push(report);
        }
        Ok(reports)
    }
}

/// Replace `"@N"` strings with the object id step `N` produced
fn resolve(step: usize, mut value: Value, reports: &[StepReport]) -> Result<Value, ScriptError> {
    substitute(step, &mut value, reports)?;
    Ok(value)
}

fn substitute(step: usize, value: &mut Value, reports: &[StepReport]) -> Result<(), ScriptError> {
    match value {
        Value::String(text) => {
            if let Some(index) = text.strip_prefix('@').and_then(|n| n.parse::<usize>().ok()) {
                let id = reports
                    .get(index)
                    .and_then(|r| r.object_id)
                    .ok_or_else(|| ScriptError::Reference {
                        step,
                        reference: text.clone(),
                    })?;
                *value = Value::String(id.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute(step, item, reports)?;
            }
        }
        Value::Object(fields) => {
            for item in fields.values_mut() {
                substitute(step, item, reports)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse(step: usize, value: Value) -> Result<SandboxCommand, ScriptError> {
    serde_json::from_value(value).map_err(|e| ScriptError::Command {
        step,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(step: usize, object_id: Option<ObjectId>) -> StepReport {
        StepReport {
            step,
            command_type: "addPrimitive".into(),
            success: object_id.is_some(),
            object_id,
            data: None,
            error: None,
        }
    }

    #[test]
    fn references_resolve_to_earlier_ids() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let reports = [report(0, Some(a)), report(1, Some(b))];

        let raw = serde_json::json!({
            "type": "performBoolean", "op": "union", "targetId": "@0", "toolId": "@1"
        });
        let command = parse(2, resolve(2, raw, &reports).unwrap()).unwrap();
        assert_eq!(
            command,
            SandboxCommand::PerformBoolean {
                op: scenelink_protocol::BooleanOp::Union,
                target_id: a,
                tool_id: b,
            }
        );
    }

    #[test]
    fn reference_to_failed_step_is_rejected() {
        let reports = [report(0, None)];
        let raw = serde_json::json!({ "type": "removeObject", "objectId": "@0" });
        let err = resolve(1, raw, &reports).unwrap_err();
        assert_eq!(
            err,
            ScriptError::Reference {
                step: 1,
                reference: "@0".into()
            }
        );
    }

    #[test]
    fn plain_strings_are_untouched() {
        let raw = serde_json::json!({ "type": "renameObject", "objectId": "x", "name": "@home" });
        let out = resolve(0, raw.clone(), &[]).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn script_must_be_an_array() {
        assert!(matches!(
            Script::parse(r#"{"type":"clearScene"}"#),
            Err(ScriptError::Parse(_))
        ));
        assert_eq!(Script::parse("[]").unwrap().len(), 0);
    }
}
