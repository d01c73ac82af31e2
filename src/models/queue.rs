use chrono::{Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Which register and day to look up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueQuery {
    pub register_no: String,
    pub visit_date: NaiveDate,
}

impl QueueQuery {
    pub fn new(register_no: impl Into<String>, visit_date: NaiveDate) -> Self {
        Self {
            register_no: register_no.into(),
            visit_date,
        }
    }

    /// Query for the clinic's current local date
    pub fn for_today(register_no: impl Into<String>) -> Self {
        Self::new(register_no, Local::now().date_naive())
    }
}

/// Number currently being served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueResult {
    pub queue_number: u64,
}

/// `{ "queueNo": 12 }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub queue_no: u64,
}

impl From<QueueResult> for QueueResponse {
    fn from(result: QueueResult) -> Self {
        Self {
            queue_no: result.queue_number,
        }
    }
}

/// Parameters accepted by `/api/queue`, from the query string or a JSON body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueParams {
    #[serde(default, deserialize_with = "string_or_number")]
    pub registerno: Option<String>,
    #[serde(default)]
    pub visitdate: Option<String>,
}

impl QueueParams {
    /// Apply defaults and validate
    pub fn into_query(self, default_register_no: &str, today: NaiveDate) -> Result<QueueQuery, ApiError> {
        let register_no = match self.registerno {
            None => default_register_no.to_string(),
            Some(r) if r.trim().is_empty() => {
                return Err(ApiError::ValidationError(
                    "registerno cannot be empty".to_string(),
                ))
            }
            Some(r) => r.trim().to_string(),
        };

        let visit_date = match self.visitdate.as_deref().map(str::trim) {
            None | Some("") => today,
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ApiError::ValidationError(format!("visitdate must be YYYY-MM-DD, got '{}'", raw))
            })?,
        };

        Ok(QueueQuery::new(register_no, visit_date))
    }
}

/// Browsers post register numbers as either `"4215"` or `4215`
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "registerno must be a string or number, got {}",
            other
        ))),
    }
}
