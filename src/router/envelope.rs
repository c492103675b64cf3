// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 QuantumXfer contributors

//! The uniform IPC envelope. One request in, exactly one final response out;
//! transfers may interleave progress events before their final response.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::{errors::CoreError, session::ProgressEvent};

/// A front-end request: `{channel, id, payload}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub channel: String,
    pub id: String,
    #[serde(default)]
    pub payload: Value,
}

/// Success envelope: `{id, success: true}` merged with the handler's domain
/// fields.
pub fn ok(id: &str, fields: Value) -> Value {
    let mut map = Map::new();
    map.insert("id".to_string(), json!(id));
    map.insert("success".to_string(), json!(true));
    if let Value::Object(extra) = fields {
        for (k, v) in extra {
            map.insert(k, v);
        }
    }
    Value::Object(map)
}

/// Failure envelope: `{id, success: false, error, code}` plus `details` for
/// validation failures. No stacks, no internal paths.
pub fn fail(id: &str, err: &CoreError) -> Value {
    let mut map = Map::new();
    map.insert("id".to_string(), json!(id));
    map.insert("success".to_string(), json!(false));
    map.insert("error".to_string(), json!(err.to_string()));
    map.insert("code".to_string(), json!(err.code()));
    if let CoreError::Validation { details } = err {
        map.insert("details".to_string(), json!(details));
    }
    Value::Object(map)
}

/// Unsolicited progress event for an in-flight transfer.
pub fn progress(event: &ProgressEvent) -> Value {
    json!({
        "channel": "progress",
        "transferId": event.transfer_id,
        "bytes": event.bytes,
        "total": event.total,
    })
}
