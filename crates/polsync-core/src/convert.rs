// ── Wire ↔ model conversion ──
//
// Device entries are the attribute bag plus `name`, an optional `uuid`,
// and `@`-prefixed metadata the device adds on read.

use polsync_api::{
    MultiConfigOperation, MultiConfigResponse, OperationAction, OperationResponse, OperationStatus,
};
use serde_json::Value;

use crate::batch::{BatchOperation, BatchResult, Verb};
use crate::error::CoreError;
use crate::model::{Attributes, LiveObject, ObjectDefinition, ObjectKind, ObjectRef};

/// Decode one listed entry into a live object with canonical attributes.
pub fn live_object(kind: ObjectKind, entry: Value) -> Result<LiveObject, CoreError> {
    let unrecognized = |message: String| CoreError::Api {
        message,
        code: Some("unrecognized-entry".into()),
    };

    let Value::Object(mut fields) = entry else {
        return Err(unrecognized(format!("{kind} entry is not an object")));
    };
    let name = match fields.remove("name") {
        Some(Value::String(name)) => name,
        _ => return Err(unrecognized(format!("{kind} entry without a name"))),
    };
    let device_id = match fields.remove("uuid") {
        Some(Value::String(id)) => Some(id),
        _ => None,
    };
    fields.retain(|key, _| !key.starts_with('@'));

    let attributes = Attributes::from_value(kind, Value::Object(fields))
        .map_err(|e| unrecognized(format!("{kind} `{name}`: {e}")))?
        .canonicalize();

    Ok(LiveObject {
        definition: ObjectDefinition {
            reference: ObjectRef::new(kind, name),
            attributes,
            dependencies: Default::default(),
        },
        device_id,
    })
}

/// Encode a batch operation for the multi-config endpoint.
pub fn operation(op: &BatchOperation) -> MultiConfigOperation {
    let entry = op.payload.as_ref().map(|attributes| {
        let mut value = attributes.to_value();
        if let Value::Object(fields) = &mut value {
            fields.insert("name".into(), Value::String(op.object.name.clone()));
        }
        value
    });
    MultiConfigOperation {
        id: op.sequence_id,
        action: match op.verb {
            Verb::Create => OperationAction::Create,
            Verb::Update => OperationAction::Update,
            Verb::Delete => OperationAction::Delete,
        },
        kind: op.object.kind.to_string(),
        name: op.object.name.clone(),
        entry,
        uuid: op.device_id.clone(),
    }
}

/// Map a multi-config response back onto the submitted operations.
///
/// In a strict request that failed, the device rolled back everything, so
/// operations it reported as successful are `NotAttempted`.
pub fn results(
    operations: &[BatchOperation],
    response: &MultiConfigResponse,
    strict: bool,
) -> Vec<BatchResult> {
    let rolled_back = strict && !response.is_success();
    operations
        .iter()
        .map(|op| result(op, response.response_for(op.sequence_id), rolled_back))
        .collect()
}

fn result(op: &BatchOperation, response: Option<&OperationResponse>, rolled_back: bool) -> BatchResult {
    match response {
        None => BatchResult::not_attempted(op.sequence_id),
        Some(r) if r.status == OperationStatus::Error => BatchResult::failed(
            op.sequence_id,
            match (&r.code, &r.message) {
                (Some(code), Some(message)) => format!("{message} ({code})"),
                (None, Some(message)) => message.clone(),
                (Some(code), None) => code.clone(),
                (None, None) => "operation failed".into(),
            },
        ),
        Some(_) if rolled_back => BatchResult::not_attempted(op.sequence_id),
        Some(r) => BatchResult::ok(op.sequence_id, r.uuid.clone()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::batch::BatchOutcome;
    use serde_json::json;

    #[test]
    fn live_entry_strips_metadata() {
        let live = live_object(
            ObjectKind::Address,
            json!({ "name": "web-1", "uuid": "u-1", "@location": "device-group", "value": "10.0.0.1/32" }),
        )
        .unwrap();
        assert_eq!(live.device_id.as_deref(), Some("u-1"));
        assert_eq!(live.definition.attributes.to_value()["value"], "10.0.0.1");
    }

    #[test]
    fn unknown_live_fields_are_reported() {
        let err = live_object(ObjectKind::Tag, json!({ "name": "t", "shade": "blue" })).unwrap_err();
        assert!(matches!(err, CoreError::Api { .. }));
    }

    #[test]
    fn strict_failure_marks_successes_not_attempted() {
        let ops: Vec<BatchOperation> = (0..3)
            .map(|i| BatchOperation {
                sequence_id: i,
                verb: Verb::Delete,
                object: ObjectRef::new(ObjectKind::Tag, format!("t{i}")),
                payload: None,
                device_id: None,
            })
            .collect();
        let response: MultiConfigResponse = serde_json::from_value(json!({
            "status": "error",
            "responses": [
                { "id": 0, "status": "success" },
                { "id": 1, "status": "error", "message": "in use" }
            ]
        }))
        .unwrap();

        let outcomes: Vec<_> = results(&ops, &response, true)
            .into_iter()
            .map(|r| r.outcome)
            .collect();
        assert_eq!(
            outcomes,
            vec![BatchOutcome::NotAttempted, BatchOutcome::Failed, BatchOutcome::NotAttempted]
        );

        let outcomes: Vec<_> = results(&ops, &response, false)
            .into_iter()
            .map(|r| r.outcome)
            .collect();
        assert_eq!(
            outcomes,
            vec![BatchOutcome::Ok, BatchOutcome::Failed, BatchOutcome::NotAttempted]
        );
    }
}
