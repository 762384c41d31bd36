//! Exam problem model plus the structural acceptance gate.
//!
//! [`validate`] decides whether a candidate problem may be persisted;
//! [`repair`] turns sloppy multiple-choice output into something that
//! passes. Both operate on `serde_json::Value` because model output arrives
//! as arbitrary JSON; [`Problem`] is the typed shape callers work with.

pub mod repair;
pub mod validate;

pub use repair::{repair_mcq, repair_problem};
pub use validate::{is_valid, requires_options, NO_OPTION_TYPES};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One generated exam item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Problem {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_valid(&self) -> bool {
        is_valid(&self.to_value())
    }

    /// Insert `value` under `key` in `metadata`, creating the object if needed.
    pub fn set_metadata(&mut self, key: &str, value: Value) {
        match self.metadata {
            Some(Value::Object(ref mut map)) => {
                map.insert(key.to_string(), value);
            }
            _ => {
                let mut map = serde_json::Map::new();
                map.insert(key.to_string(), value);
                self.metadata = Some(Value::Object(map));
            }
        }
    }
}
