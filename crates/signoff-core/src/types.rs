use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Opaque structured payload carried by a request
///
/// The engine never interprets the payload; it is a wrapper around a JSON
/// value that callers (leave forms, certificate requests, archive
/// submissions) fill and read on their own terms.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    /// The inner JSON value
    pub value: serde_json::Value,
}

impl Payload {
    /// Create a payload from a JSON value
    #[inline]
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Create an empty (null) payload
    #[inline]
    pub fn null() -> Self {
        Self {
            value: serde_json::Value::Null,
        }
    }

    /// Borrow the inner JSON value
    #[inline]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Take ownership of the inner JSON value
    #[inline]
    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Whether the payload is null
    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Deserialize the payload into a caller-defined type
    pub fn to<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.value.clone())
    }

    /// Build a payload from any serializable value
    pub fn from<T>(value: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize,
    {
        Ok(Self::new(serde_json::to_value(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_creation() {
        let payload = Payload::new(json!({"days": 3, "reason": "annual leave"}));
        assert_eq!(payload.as_value()["days"], 3);
    }

    #[test]
    fn test_payload_null() {
        let payload = Payload::null();
        assert!(payload.is_null());
        assert!(!Payload::new(json!(42)).is_null());
    }

    #[test]
    fn test_payload_roundtrip() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct LeaveForm {
            days: u32,
            reason: String,
        }

        let form = LeaveForm {
            days: 5,
            reason: "travel".to_string(),
        };

        let payload = Payload::from(&form).unwrap();
        let back: LeaveForm = payload.to().unwrap();
        assert_eq!(back, form);
    }

    #[test]
    fn test_payload_serialization() {
        let original = Payload::new(json!({"nested": {"values": [1, 2, 3]}}));
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: Payload = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_payload_into_value() {
        let payload = Payload::new(json!("certificate"));
        assert_eq!(payload.into_value(), json!("certificate"));
    }
}
