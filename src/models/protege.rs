use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::queue::QueueQuery;

/// Queue lookup endpoint, relative to the Protege base URL
pub const QUEUE_LOOKUP_PATH: &str = "/api/protege/get_last_queue_no";

// ==================================================================================================
// Request Models
// ==================================================================================================

/// Body of `POST /api/protege/get_last_queue_no`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueLookupRequest {
    pub registerno: String,
    /// `YYYY-MM-DD`
    pub visitdate: String,
}

impl From<&QueueQuery> for QueueLookupRequest {
    fn from(query: &QueueQuery) -> Self {
        Self {
            registerno: query.register_no.clone(),
            visitdate: query.visit_date.format("%Y-%m-%d").to_string(),
        }
    }
}

// ==================================================================================================
// Response Models
// ==================================================================================================

/// `{ "data": [ { "queuno": 12, ... }, ... ] }`
///
/// `data` is kept loose: an empty, missing or oddly shaped list means
/// "no patient called yet" rather than a failure.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueLookupResponse {
    pub data: Option<Value>,
}

impl QueueLookupResponse {
    /// Parse a lookup body. Anything that is not a JSON object is rejected.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("expected a JSON object"));
        }
        serde_json::from_value(value)
    }

    /// `queuno` of the first row, or 0
    pub fn queue_number(&self) -> u64 {
        self.data
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("queuno"))
            .and_then(parse_queue_number)
            .unwrap_or(0)
    }
}

/// Protege has been seen to send `queuno` both as a number and as a string
fn parse_queue_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            // `12.0` is still queue number 12
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
