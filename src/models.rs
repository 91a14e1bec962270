use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::PipelineError;

/// The normalized product record. Absent fields serialize as explicit
/// `null`, never omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub image: Option<String>,
    pub title: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
}

impl ProductRecord {
    pub fn is_empty(&self) -> bool {
        self.image.is_none()
            && self.title.is_none()
            && self.price.is_none()
            && self.description.is_none()
    }
}

/// Body of a successful (HTTP 200) lookup: either the record or a soft
/// error. Soft errors mean "no metadata for this page", which callers
/// display as a normal outcome rather than a system fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LookupResponse {
    Record(ProductRecord),
    SoftError { error: String },
}

impl LookupResponse {
    pub fn soft_error(message: impl Into<String>) -> Self {
        Self::SoftError {
            error: message.into(),
        }
    }
}

/// Body of a rejected (4xx) request.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub const INVALID_BODY: &str = "Invalid request body";
pub const NO_URL: &str = "No URL provided";
pub const INVALID_URL: &str = "Invalid URL";

/// Incoming `{"url": ...}` payload. Parsed by hand so that every rejection
/// carries one of the fixed caller-facing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub url: String,
}

impl LookupRequest {
    pub fn from_body(body: &[u8]) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| PipelineError::invalid_input("request", INVALID_BODY))?;
        if value.is_null() {
            return Err(PipelineError::invalid_input("request", INVALID_BODY));
        }
        match value.get("url") {
            None | Some(Value::Null) => Err(PipelineError::invalid_input("request", NO_URL)),
            Some(Value::String(url)) if url.is_empty() => {
                Err(PipelineError::invalid_input("request", NO_URL))
            }
            Some(Value::String(url)) => Ok(Self { url: url.clone() }),
            Some(_) => Err(PipelineError::invalid_input("request", INVALID_URL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_every_key() {
        let record = ProductRecord {
            title: Some("Y2K Baby Tee".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(LookupResponse::Record(record)).unwrap();
        assert_eq!(
            value,
            json!({"image": null, "title": "Y2K Baby Tee", "price": null, "description": null})
        );
    }

    #[test]
    fn soft_error_has_only_the_error_key() {
        let value = serde_json::to_value(LookupResponse::soft_error("nope")).unwrap();
        assert_eq!(value, json!({"error": "nope"}));
    }

    #[test]
    fn request_body_rejections() {
        let detail = |body: &str| {
            LookupRequest::from_body(body.as_bytes())
                .unwrap_err()
                .detail()
                .to_string()
        };
        assert_eq!(detail("{not json"), INVALID_BODY);
        assert_eq!(detail(""), INVALID_BODY);
        assert_eq!(detail("null"), INVALID_BODY);
        assert_eq!(detail("{}"), NO_URL);
        assert_eq!(detail(r#"{"url": null}"#), NO_URL);
        assert_eq!(detail(r#"{"url": ""}"#), NO_URL);
        assert_eq!(detail("[1, 2]"), NO_URL);
        assert_eq!(detail(r#"{"url": 42}"#), INVALID_URL);
    }

    #[test]
    fn request_body_accepts_string_url() {
        let req = LookupRequest::from_body(br#"{"url": "https://example.com/p/1"}"#).unwrap();
        assert_eq!(req.url, "https://example.com/p/1");
    }
}
