//! Response envelope normalization.
//!
//! Server endpoints answer either with a `{message, data}` envelope or with a
//! bare body. Callers always receive a [`DataResponse`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Message used when a bare body is wrapped.
pub const DEFAULT_MESSAGE: &str = "Success";

/// Success response carrying data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse<T> {
    #[serde(default)]
    pub message: String,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl DataResponse<Value> {
    /// Deserialize `data` into a concrete type.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<DataResponse<T>> {
        let data = serde_json::from_value(self.data).map_err(|e| {
            ClientError::decode(format!("unexpected response data shape: {}", e))
        })?;
        Ok(DataResponse {
            message: self.message,
            data,
        })
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ErrorResponse {
    /// Best-effort parse; falls back to the raw text as the message.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_else(|_| Self {
            code: None,
            message: String::from_utf8_lossy(body).trim().to_string(),
        })
    }
}

/// Normalize a decoded body.
///
/// An object with a `data` key is returned as-is; anything else becomes the
/// `data` of a synthesized envelope.
pub fn normalize(body: Value) -> DataResponse<Value> {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            let data = map.remove("data").unwrap_or(Value::Null);
            let message = match map.remove("message") {
                Some(Value::String(message)) => message,
                _ => String::new(),
            };
            DataResponse { message, data }
        }
        raw => DataResponse::new(DEFAULT_MESSAGE, raw),
    }
}

/// Decode raw response bytes and normalize them.
///
/// An empty body is `null`, a non-JSON body is kept as a string.
pub fn decode_body(body: &[u8]) -> DataResponse<Value> {
    let value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
    };
    normalize(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enveloped_body_is_unchanged() {
        let response = normalize(json!({"data": {"id": 5}}));
        assert_eq!(response.data, json!({"id": 5}));
        assert_eq!(response.message, "");

        let response = normalize(json!({"message": "Login successful", "data": {"id": 5}}));
        assert_eq!(response.message, "Login successful");
        assert_eq!(response.data, json!({"id": 5}));
    }

    #[test]
    fn test_bare_body_is_wrapped() {
        let response = normalize(json!({"id": 5}));
        assert_eq!(response, DataResponse::new("Success", json!({"id": 5})));

        // Message-only bodies have no `data` key either.
        let response = normalize(json!({"message": "Logout successful"}));
        assert_eq!(response.message, "Success");
        assert_eq!(response.data, json!({"message": "Logout successful"}));

        let response = normalize(json!([1, 2, 3]));
        assert_eq!(response.data, json!([1, 2, 3]));
    }

    #[test]
    fn test_explicit_null_data_counts_as_present() {
        let response = normalize(json!({"message": "ok", "data": null}));
        assert_eq!(response.message, "ok");
        assert_eq!(response.data, Value::Null);
    }

    #[test]
    fn test_decode_body_edge_cases() {
        assert_eq!(decode_body(b"").data, Value::Null);
        assert_eq!(decode_body(b"  \n").data, Value::Null);
        assert_eq!(decode_body(b"pong").data, json!("pong"));
        assert_eq!(decode_body(br#"{"data":[1]}"#).data, json!([1]));
    }

    #[test]
    fn test_into_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Item {
            id: u32,
        }

        let typed: DataResponse<Item> = normalize(json!({"id": 5})).into_typed().unwrap();
        assert_eq!(typed.data, Item { id: 5 });

        let err = normalize(json!({"name": "x"})).into_typed::<Item>().unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn test_error_response_parse() {
        let parsed = ErrorResponse::parse(br#"{"code":"INVALID_TOKEN","message":"token expired"}"#);
        assert_eq!(parsed.code.as_deref(), Some("INVALID_TOKEN"));
        assert_eq!(parsed.message, "token expired");

        let parsed = ErrorResponse::parse(b"Bad Gateway");
        assert_eq!(parsed.code, None);
        assert_eq!(parsed.message, "Bad Gateway");
    }
}
