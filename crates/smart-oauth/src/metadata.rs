//! SMART configuration document model.
//!
//! [`ServerMetadata`] is a lenient, typed view over the JSON served at
//! `/.well-known/smart-configuration`. Parsing never fails because a field is
//! missing; whether the document is usable is answered separately by
//! [`ServerMetadata::is_valid`] and [`ServerMetadata::missing_fields`], which
//! apply the capability-driven requirement table below.
//!
//! # Example
//!
//! ```
//! use smart_oauth::ServerMetadata;
//! use serde_json::json;
//!
//! let metadata = ServerMetadata::from_value(json!({
//!     "token_endpoint": "https://ehr.example.com/token",
//!     "grant_types_supported": ["authorization_code"],
//!     "capabilities": ["launch-standalone"],
//!     "code_challenge_methods_supported": ["S256"]
//! }))
//! .unwrap();
//!
//! assert!(metadata.declares("launch-standalone"));
//! assert!(!metadata.supports_standalone_launch());
//! assert_eq!(metadata.missing_fields(), vec!["authorization_endpoint"]);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod capability {
    pub const LAUNCH_EHR: &str = "launch-ehr";
    pub const LAUNCH_STANDALONE: &str = "launch-standalone";
    pub const SSO_OPENID_CONNECT: &str = "sso-openid-connect";
    pub const CLIENT_PUBLIC: &str = "client-public";
    pub const CLIENT_CONFIDENTIAL_SYMMETRIC: &str = "client-confidential-symmetric";
    pub const CLIENT_CONFIDENTIAL_ASYMMETRIC: &str = "client-confidential-asymmetric";
}

/// Fields every SMART configuration document must carry.
pub const ALWAYS_REQUIRED: &[&str] = &[
    "token_endpoint",
    "grant_types_supported",
    "capabilities",
    "code_challenge_methods_supported",
];

/// Fields that become required once a capability is declared.
pub const CONDITIONAL_REQUIREMENTS: &[(&str, &[&str])] = &[
    (capability::LAUNCH_EHR, &["authorization_endpoint"]),
    (capability::LAUNCH_STANDALONE, &["authorization_endpoint"]),
    (capability::SSO_OPENID_CONNECT, &["issuer", "jwks_uri"]),
];

/// Fields additionally required by a capability set, in table order.
pub fn required_fields_for<S: AsRef<str>>(capabilities: &[S]) -> Vec<&'static str> {
    let mut fields: Vec<&'static str> = Vec::new();
    for (cap, required) in CONDITIONAL_REQUIREMENTS {
        if capabilities.iter().any(|c| c.as_ref() == *cap) {
            for field in *required {
                if !fields.contains(field) {
                    fields.push(field);
                }
            }
        }
    }
    fields
}

/// Parsed SMART configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// SMART capability strings, e.g. `launch-standalone`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_access_brand_bundle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_access_brand_identifier: Option<String>,

    /// Everything the server sent that is not modeled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerMetadata {
    /// Build from a decoded JSON value. Fails only if the value is not an
    /// object or a known field has the wrong JSON type.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn from_map(map: Map<String, Value>) -> serde_json::Result<Self> {
        Self::from_value(Value::Object(map))
    }

    /// Declared capabilities, empty when the field is absent.
    pub fn capabilities(&self) -> &[String] {
        self.capabilities.as_deref().unwrap_or_default()
    }

    pub fn capabilities_mut(&mut self) -> &mut Vec<String> {
        self.capabilities.get_or_insert_with(Vec::new)
    }

    /// Whether the server claims a capability, regardless of document completeness.
    pub fn declares(&self, capability: &str) -> bool {
        self.capabilities().iter().any(|c| c == capability)
    }

    /// Whether a named top-level field is present and non-empty.
    pub fn has_field(&self, name: &str) -> bool {
        fn text(v: &Option<String>) -> bool {
            v.as_deref().is_some_and(|s| !s.trim().is_empty())
        }

        match name {
            "issuer" => text(&self.issuer),
            "jwks_uri" => text(&self.jwks_uri),
            "authorization_endpoint" => text(&self.authorization_endpoint),
            "token_endpoint" => text(&self.token_endpoint),
            "registration_endpoint" => text(&self.registration_endpoint),
            "management_endpoint" => text(&self.management_endpoint),
            "introspection_endpoint" => text(&self.introspection_endpoint),
            "revocation_endpoint" => text(&self.revocation_endpoint),
            "user_access_brand_bundle" => text(&self.user_access_brand_bundle),
            "user_access_brand_identifier" => text(&self.user_access_brand_identifier),
            "grant_types_supported" => self.grant_types_supported.is_some(),
            "capabilities" => self.capabilities.is_some(),
            "code_challenge_methods_supported" => self.code_challenge_methods_supported.is_some(),
            "token_endpoint_auth_methods_supported" => {
                self.token_endpoint_auth_methods_supported.is_some()
            }
            "scopes_supported" => self.scopes_supported.is_some(),
            "response_types_supported" => self.response_types_supported.is_some(),
            other => self.extra.get(other).is_some_and(|v| !v.is_null()),
        }
    }

    /// Required fields that are absent, always-required first, then the
    /// conditional ones in table order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        ALWAYS_REQUIRED
            .iter()
            .copied()
            .chain(required_fields_for(self.capabilities()))
            .filter(|field| !self.has_field(field))
            .collect()
    }

    /// Re-derives the full requirement rule set on every call.
    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn supports_ehr_launch(&self) -> bool {
        self.declares(capability::LAUNCH_EHR) && self.has_field("authorization_endpoint")
    }

    pub fn supports_standalone_launch(&self) -> bool {
        self.declares(capability::LAUNCH_STANDALONE) && self.has_field("authorization_endpoint")
    }

    pub fn supports_openid_connect(&self) -> bool {
        self.declares(capability::SSO_OPENID_CONNECT)
            && self.has_field("issuer")
            && self.has_field("jwks_uri")
    }

    pub fn supports_public_clients(&self) -> bool {
        self.declares(capability::CLIENT_PUBLIC)
    }

    pub fn supports_confidential_symmetric(&self) -> bool {
        self.declares(capability::CLIENT_CONFIDENTIAL_SYMMETRIC)
    }

    pub fn supports_confidential_asymmetric(&self) -> bool {
        self.declares(capability::CLIENT_CONFIDENTIAL_ASYMMETRIC)
    }

    pub fn supports_pkce_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_deref()
            .is_some_and(|methods| methods.iter().any(|m| m == "S256"))
    }

    pub fn supports_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types_supported
            .as_deref()
            .is_some_and(|grants| grants.iter().any(|g| g == grant_type))
    }
}
