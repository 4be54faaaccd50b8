// Response classification shared by every command. The outcome depends
// only on the status code; the body is just carried along.

use crate::api::StatusEnvelope;
use serde_json::Value;

/// Text used when a rejection or fault arrives with an empty body.
pub const NO_REASON: &str = "(no reason given)";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 200: body parsed as JSON (plain text becomes a JSON string).
    Success(Value),
    /// 400: expected, user-facing rejection.
    ClientRejected(String),
    /// 500: server-side fault, shown to the operator, never retried.
    ServerFault(String),
    /// Anything else, kept raw for diagnosis.
    Unrecognized(u16),
}

pub fn classify(envelope: &StatusEnvelope) -> Outcome {
    match envelope.status {
        200 => Outcome::Success(parse_body(&envelope.body)),
        400 => Outcome::ClientRejected(extract_message(&envelope.body)),
        500 => Outcome::ServerFault(extract_message(&envelope.body)),
        other => Outcome::Unrecognized(other),
    }
}

fn parse_body(body: &str) -> Value {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn extract_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return NO_REASON.to_string();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Ok(other) => other.to_string(),
        Err(_) => trimmed.to_string(),
    }
}
