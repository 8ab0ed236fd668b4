//! Turns raw cached values into the payloads sent to the incident API.
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("invalid incident JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("child incident uuid is empty")]
    EmptyChildUuid,
}

/// Incident payload for the create endpoint. Always carries `domain` and
/// `auth_token`; every other field is passed through as produced upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IncidentRecord(Map<String, Value>);

impl IncidentRecord {
    /// Decodes a cached incident. Producers write the incident either as a
    /// JSON object or as a JSON string holding the object text, both are
    /// accepted.
    pub fn from_cached(raw: &[u8], auth_token: &str) -> Result<Self, DecodeError> {
        let mut fields: Map<String, Value> = match serde_json::from_slice::<String>(raw) {
            Ok(inner) => serde_json::from_str(&inner)?,
            Err(_) => serde_json::from_slice(raw)?,
        };

        let domain = match fields.remove("domain") {
            Some(Value::String(domain)) if !domain.is_empty() => domain,
            _ => String::new(),
        };
        fields.insert("domain".into(), Value::String(domain));
        fields.insert("auth_token".into(), Value::String(auth_token.into()));

        Ok(IncidentRecord(fields))
    }

    pub fn domain(&self) -> &str {
        self.0.get("domain").and_then(Value::as_str).unwrap_or_default()
    }
}

/// Payload for the link endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRequest {
    #[serde(rename = "parent_incident_uuid")]
    pub parent_uuid: String,
    #[serde(rename = "child_incident_uuid")]
    pub child_uuid: String,
    pub auth_token: String,
}

impl LinkRequest {
    /// The cached value is the child uuid, possibly wrapped in quotes.
    pub fn from_cached(parent_uuid: &str, raw: &[u8], auth_token: &str) -> Result<Self, DecodeError> {
        let child = String::from_utf8(raw.to_vec())?;
        let child_uuid = child.trim_matches('"');
        if child_uuid.is_empty() {
            return Err(DecodeError::EmptyChildUuid);
        }

        Ok(LinkRequest {
            parent_uuid: parent_uuid.trim_matches('"').to_string(),
            child_uuid: child_uuid.to_string(),
            auth_token: auth_token.to_string(),
        })
    }
}
