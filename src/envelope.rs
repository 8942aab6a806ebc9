#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::error::MirrorError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON document the CLI prints on stdout for one-shot commands.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    pub t: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Box<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<Box<EnvelopeError>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub msg: String,
}

impl Envelope {
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            t: Utc::now().timestamp_millis(),
            d: Some(Box::new(data)),
            err: None,
        }
    }

    #[must_use]
    pub fn failure(error: &MirrorError) -> Self {
        Self {
            ok: false,
            t: Utc::now().timestamp_millis(),
            d: None,
            err: Some(Box::new(EnvelopeError {
                code: error.code().to_string(),
                msg: error.to_string(),
            })),
        }
    }

    /// # Errors
    /// Returns `MirrorError::SerializationError` if the payload cannot be encoded.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self).map_err(MirrorError::from)
    }
}
