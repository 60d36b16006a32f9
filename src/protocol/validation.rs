//! Request schema checks
//!
//! Bodies are parsed to a [`serde_json::Value`] first and then checked field by
//! field, so every failure comes back as a tagged [`ValidationError`] naming
//! the offending location. Extra fields are ignored.

use serde_json::{Map, Value};

use crate::protocol::http::{EmbedBatchRequest, EmbedRequest};

/// Why a request body was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Field '{location}' must be {expected}")]
    InvalidType {
        location: String,
        expected: &'static str,
    },
}

impl ValidationError {
    /// Stable error code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidJson { .. } => "INVALID_JSON",
            ValidationError::NotAnObject => "NOT_AN_OBJECT",
            ValidationError::MissingField { .. } => "MISSING_FIELD",
            ValidationError::InvalidType { .. } => "INVALID_TYPE",
        }
    }

    /// Location of the bad value inside the body, if any
    pub fn location(&self) -> Option<String> {
        match self {
            ValidationError::MissingField { field } => Some((*field).to_string()),
            ValidationError::InvalidType { location, .. } => Some(location.clone()),
            _ => None,
        }
    }
}

/// Check a `POST /embed` body
pub fn parse_embed_request(body: &[u8]) -> Result<EmbedRequest, ValidationError> {
    let mut object = parse_object(body)?;
    let text = match required(&mut object, "text")? {
        Value::String(text) => text,
        _ => {
            return Err(ValidationError::InvalidType {
                location: "text".to_string(),
                expected: "a string",
            })
        }
    };
    Ok(EmbedRequest { text })
}

/// Check a `POST /embed_batch` body
pub fn parse_embed_batch_request(body: &[u8]) -> Result<EmbedBatchRequest, ValidationError> {
    let mut object = parse_object(body)?;
    let items = match required(&mut object, "texts")? {
        Value::Array(items) => items,
        _ => {
            return Err(ValidationError::InvalidType {
                location: "texts".to_string(),
                expected: "an array of strings",
            })
        }
    };

    let texts = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(text) => Ok(text),
            _ => Err(ValidationError::InvalidType {
                location: format!("texts[{}]", index),
                expected: "a string",
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EmbedBatchRequest { texts })
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| ValidationError::InvalidJson {
        message: e.to_string(),
    })?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(ValidationError::NotAnObject),
    }
}

// null counts as missing
fn required(
    object: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Value, ValidationError> {
    match object.remove(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField { field }),
        Some(value) => Ok(value),
    }
}
