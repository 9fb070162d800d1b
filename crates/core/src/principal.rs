// Principal: the authenticated identity carried through one request
// Decision: Serialized as JSON in the internal x-user header
// Decision: Header encoding escapes non-ASCII so any display name is a legal header value

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};

/// Internal identity header injected by the gateway and trusted by backends.
pub const USER_HEADER: &str = "x-user";

/// Authenticated identity and its entitlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject (user ID or external provider subject)
    pub sub: String,
    pub email: String,
    pub name: String,
    /// Profile picture reference (URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Service names this principal may reach through the gateway
    #[serde(default)]
    pub services: Vec<String>,
}

impl Principal {
    /// Check whether the principal is entitled to a service.
    /// An empty entitlement list grants nothing.
    pub fn is_entitled(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }

    /// Encode as an `x-user` header value.
    pub fn to_header_value(&self) -> anyhow::Result<HeaderValue> {
        let json = serde_json::to_string(self)?;
        Ok(HeaderValue::from_str(&escape_non_ascii(&json))?)
    }

    /// Decode from an `x-user` header value.
    pub fn from_header_value(value: &HeaderValue) -> anyhow::Result<Self> {
        let raw = value.to_str()?;
        Ok(serde_json::from_str(raw)?)
    }
}

/// Replace every non-ASCII character with its JSON `\uXXXX` escape.
/// Non-ASCII can only occur inside JSON strings, so the output is still valid JSON.
fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut buf = [0u16; 2];
            for unit in c.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
