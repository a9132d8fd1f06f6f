//! Wire model for audit events.
//!
//! The canonical encoding is self-describing JSON with camelCase field names
//! (`message`, `category`, `operation`, `occurredAt`) and RFC 3339 timestamps.
//! Category and operation are open sets so producers can introduce new values
//! without a consumer release.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Domain an event is filed under (`PRODUCT`, `ORDER`, ...).
///
/// Constructing one uppercases the value; deserializing keeps the wire value
/// verbatim so the consumer never rewrites what a producer sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Routing key for this category: `log.<category-lowercase>.event`.
    /// Stable per producer type.
    pub fn routing_key(&self) -> String {
        format!("log.{}.event", self.0.to_lowercase())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Write action the event reports. The named variants are the ones the source
/// services emit today; anything else round-trips through `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    UploadImage,
    DeleteImage,
    Other(String),
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::UploadImage => "UPLOAD_IMAGE",
            Operation::DeleteImage => "DELETE_IMAGE",
            Operation::Other(value) => value,
        }
    }

    fn from_wire(value: &str) -> Self {
        match value {
            "CREATE" => Operation::Create,
            "UPDATE" => Operation::Update,
            "DELETE" => Operation::Delete,
            "UPLOAD_IMAGE" => Operation::UploadImage,
            "DELETE_IMAGE" => Operation::DeleteImage,
            other => Operation::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Operation {
    fn from(value: &str) -> Self {
        Self::from_wire(value)
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Operation::from_wire(&value))
    }
}

/// One audit event, immutable once constructed.
///
/// `occurred_at` is stamped by the producer at construction time; neither the
/// broker nor the consumer ever infers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub message: String,
    pub category: Category,
    pub operation: Operation,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        message: impl Into<String>,
        category: impl Into<Category>,
        operation: impl Into<Operation>,
    ) -> Self {
        Self {
            message: message.into(),
            category: category.into(),
            operation: operation.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Canonical encoding. Fails on an event that would not survive the
    /// decode-side checks, so a producer cannot emit a body the consumer is
    /// forced to drop.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MalformedEventError> {
        self.validate()?;
        serde_json::to_vec(self).map_err(|err| MalformedEventError::Json(err.to_string()))
    }

    /// Canonical decoding. Unknown extra fields are ignored; unknown category
    /// and operation values are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MalformedEventError> {
        let event: AuditEvent =
            serde_json::from_slice(bytes).map_err(|err| MalformedEventError::Json(err.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), MalformedEventError> {
        if self.message.trim().is_empty() {
            return Err(MalformedEventError::EmptyField("message"));
        }
        if self.category.as_str().trim().is_empty() {
            return Err(MalformedEventError::EmptyField("category"));
        }
        if self.operation.as_str().trim().is_empty() {
            return Err(MalformedEventError::EmptyField("operation"));
        }
        Ok(())
    }
}

/// Permanent decode failure: the body is not an audit event and never will be.
#[derive(Debug, Error)]
pub enum MalformedEventError {
    #[error("invalid event body: {0}")]
    Json(String),
    #[error("field `{0}` is missing or empty")]
    EmptyField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> AuditEvent {
        AuditEvent::new("created product 7", "PRODUCT", "CREATE")
            .with_occurred_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap())
    }

    #[test]
    fn encodes_camel_case_with_rfc3339_timestamp() {
        let bytes = sample().to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["message"], "created product 7");
        assert_eq!(value["category"], "PRODUCT");
        assert_eq!(value["operation"], "CREATE");
        assert_eq!(value["occurredAt"], "2025-06-01T12:30:00Z");
    }

    #[test]
    fn round_trips_through_the_canonical_codec() {
        let event = sample();
        let decoded = AuditEvent::from_bytes(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let body = br#"{"category":"PRODUCT","operation":"CREATE","occurredAt":"2025-06-01T12:30:00Z"}"#;
        assert!(matches!(AuditEvent::from_bytes(body), Err(MalformedEventError::Json(_))));
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        let body = br#"{"message":42,"category":"PRODUCT","operation":"CREATE","occurredAt":"2025-06-01T12:30:00Z"}"#;
        assert!(matches!(AuditEvent::from_bytes(body), Err(MalformedEventError::Json(_))));
    }

    #[test]
    fn unparseable_timestamp_is_malformed() {
        let body = br#"{"message":"x","category":"PRODUCT","operation":"CREATE","occurredAt":"yesterday"}"#;
        assert!(matches!(AuditEvent::from_bytes(body), Err(MalformedEventError::Json(_))));
    }

    #[test]
    fn empty_message_is_malformed_on_both_sides() {
        let body = br#"{"message":"  ","category":"PRODUCT","operation":"CREATE","occurredAt":"2025-06-01T12:30:00Z"}"#;
        assert!(matches!(
            AuditEvent::from_bytes(body),
            Err(MalformedEventError::EmptyField("message"))
        ));
        let event = AuditEvent::new("", "PRODUCT", "CREATE");
        assert!(matches!(event.to_bytes(), Err(MalformedEventError::EmptyField("message"))));
    }

    #[test]
    fn unknown_categories_and_operations_are_accepted() {
        let body = br#"{"message":"new gallery image","category":"GALLERY","operation":"ARCHIVE","occurredAt":"2025-06-01T12:30:00Z"}"#;
        let event = AuditEvent::from_bytes(body).unwrap();
        assert_eq!(event.category.as_str(), "GALLERY");
        assert_eq!(event.operation, Operation::Other("ARCHIVE".into()));
        assert_eq!(event.operation.as_str(), "ARCHIVE");
    }

    #[test]
    fn extra_fields_are_ignored() {
        let body = br#"{"message":"x","category":"ORDER","operation":"DELETE","occurredAt":"2025-06-01T12:30:00Z","traceId":"abc"}"#;
        let event = AuditEvent::from_bytes(body).unwrap();
        assert_eq!(event.operation, Operation::Delete);
    }

    #[test]
    fn category_normalizes_case_and_derives_the_routing_key() {
        let category = Category::new("Product");
        assert_eq!(category.as_str(), "PRODUCT");
        assert_eq!(category.routing_key(), "log.product.event");
        assert_eq!(Category::new("RESERVATION").routing_key(), "log.reservation.event");
    }
}
