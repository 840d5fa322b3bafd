//! # Handler Responses
//!
//! Wire response produced by a generated entry point, and the tagged
//! HTTP error value rendered into it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response contract of every generated handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,

    #[serde(default, deserialize_with = "lenient_strings")]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: String,
}

/// Header values written by hand-authored hooks are not always strings
/// (`'Access-Control-Allow-Credentials': true`), so scalars are stringified.
fn lenient_strings<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

impl HandlerResponse {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// Whether the response carries a header, compared case-insensitively
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

/// Kind of an HTTP-status-carrying error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    NotFound,
    MethodNotAllowed,
    /// 422: well-formed but semantically rejected input
    InputRejected,
    Internal,
}

impl HttpErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::InputRejected => 422,
            Self::Internal => 500,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::NotFound => "Not found",
            Self::MethodNotAllowed => "Method not allowed",
            Self::InputRejected => "Input rejected",
            Self::Internal => "Error",
        }
    }
}

/// An error carrying `{httpStatusCode, message, data}`
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    pub kind: HttpErrorKind,
    pub message: String,
    pub data: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            data: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// Render into the handler response contract
    pub fn into_response(self) -> HandlerResponse {
        let status_code = self.status_code();
        let mut body = json!({
            "errorMessage": self.message,
            "statusCode": status_code,
        });
        if let Some(data) = self.data {
            body["data"] = data;
        }
        HandlerResponse {
            status_code,
            headers: self.headers,
            body: body.to_string(),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code(), self.message)
    }
}

impl std::error::Error for HttpError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HttpErrorKind::MethodNotAllowed.status_code(), 405);
        assert_eq!(HttpErrorKind::InputRejected.status_code(), 422);
        assert_eq!(HttpError::new(HttpErrorKind::Internal).status_code(), 500);
    }

    #[test]
    fn test_into_response_body() {
        let response = HttpError::new(HttpErrorKind::InputRejected)
            .with_message("email is required")
            .with_data(json!({ "field": "email" }))
            .into_response();

        assert_eq!(response.status_code, 422);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["errorMessage"], "email is required");
        assert_eq!(body["statusCode"], 422);
        assert_eq!(body["data"]["field"], "email");
    }

    #[test]
    fn test_response_deserializes_wire_shape() {
        let response: HandlerResponse = serde_json::from_str(
            r#"{"statusCode":200,"headers":{"Access-Control-Allow-Origin":"*"},"body":"{}"}"#,
        )
        .unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.has_header("access-control-allow-origin"));
    }

    #[test]
    fn test_non_string_header_values() {
        let response: HandlerResponse = serde_json::from_str(
            r#"{"statusCode":200,"headers":{"Access-Control-Allow-Credentials":true},"body":""}"#,
        )
        .unwrap();
        assert_eq!(
            response.headers.get("Access-Control-Allow-Credentials"),
            Some(&"true".to_string())
        );
    }
}
