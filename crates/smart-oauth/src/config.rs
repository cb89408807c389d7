//! Client configuration.
//!
//! A [`ClientConfiguration`] can be assembled with the builder, normalized
//! from a raw key/value map, or read from a TOML file:
//!
//! ```toml
//! client_id = "my-app"
//! redirect_uri = "https://app.example.com/callback"
//! issuer = "https://ehr.example.com/fhir"
//! scopes = ["openid", "fhirUser", "launch/patient"]
//! ```
//!
//! Every constructor validates eagerly, so a value of this type always holds
//! a client id, redirect URI and issuer.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Result, SmartError};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "SMART_";

/// Validated, immutable client configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfiguration {
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    scopes: Vec<String>,
    issuer: String,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
}

impl ClientConfiguration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Normalize a raw key/value map. `base_url` is accepted for `issuer`
    /// and `scopes` may be a list or a space-separated string.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let raw: RawConfiguration = serde_json::from_value(Value::Object(map))
            .map_err(|e| SmartError::Configuration(format!("invalid configuration map: {}", e)))?;
        raw.try_into()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        RawConfiguration::from_toml_str(content)?.try_into()
    }

    /// Read a TOML file and layer `SMART_*` environment variables over it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SmartError::Configuration(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let raw = RawConfiguration::from_toml_str(&content)?.with_overrides(std::env::vars());
        tracing::debug!(path = %path.display(), "Loaded client configuration");
        raw.try_into()
    }

    /// Check that every required attribute is present and well formed.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("issuer", &self.issuer),
        ] {
            if value.trim().is_empty() {
                missing.push(name.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(SmartError::MissingConfiguration { fields: missing });
        }

        check_url("redirect_uri", &self.redirect_uri)?;
        check_url("issuer", &self.issuer)?;
        if let Some(endpoint) = &self.authorization_endpoint {
            check_url("authorization_endpoint", endpoint)?;
        }
        if let Some(endpoint) = &self.token_endpoint {
            check_url("token_endpoint", endpoint)?;
        }
        Ok(())
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn authorization_endpoint(&self) -> Option<&str> {
        self.authorization_endpoint.as_deref()
    }

    pub fn token_endpoint(&self) -> Option<&str> {
        self.token_endpoint.as_deref()
    }
}

impl fmt::Debug for ClientConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfiguration")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("issuer", &self.issuer)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

fn check_url(field: &str, value: &str) -> Result<()> {
    Url::parse(value).map(|_| ()).map_err(|e| {
        SmartError::Configuration(format!("{} '{}' is not a valid URL: {}", field, value, e))
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw (unvalidated) configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration as read from a map, file or environment, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfiguration {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, alias = "base_url")]
    pub issuer: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
}

impl RawConfiguration {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SmartError::Configuration(format!("failed to parse config: {}", e)))
    }

    /// Apply `SMART_*` overrides from an iterator of environment pairs.
    pub fn with_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "CLIENT_ID" => self.client_id = Some(value),
                "CLIENT_SECRET" => self.client_secret = Some(value),
                "REDIRECT_URI" => self.redirect_uri = Some(value),
                "SCOPES" => self.scopes = Some(split_scopes(&value)),
                "ISSUER" | "BASE_URL" => self.issuer = Some(value),
                "AUTHORIZATION_ENDPOINT" => self.authorization_endpoint = Some(value),
                "TOKEN_ENDPOINT" => self.token_endpoint = Some(value),
                _ => {}
            }
        }
        self
    }
}

impl TryFrom<RawConfiguration> for ClientConfiguration {
    type Error = SmartError;

    fn try_from(raw: RawConfiguration) -> Result<Self> {
        let config = ClientConfiguration {
            client_id: raw.client_id.unwrap_or_default(),
            client_secret: non_blank(raw.client_secret),
            redirect_uri: raw.redirect_uri.unwrap_or_default(),
            scopes: raw
                .scopes
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            issuer: raw.issuer.unwrap_or_default(),
            authorization_endpoint: non_blank(raw.authorization_endpoint),
            token_endpoint: non_blank(raw.token_endpoint),
        };
        config.validate()?;
        Ok(config)
    }
}

fn split_scopes(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn deserialize_scopes<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<Scopes>::deserialize(deserializer)? {
        Some(Scopes::List(list)) => Some(list),
        Some(Scopes::Text(text)) => Some(split_scopes(&text)),
        None => None,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`ClientConfiguration`].
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    raw: RawConfiguration,
}

impl ConfigurationBuilder {
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.raw.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.raw.client_secret = Some(secret.into());
        self
    }

    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.raw.redirect_uri = Some(uri.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.raw.issuer = Some(issuer.into());
        self
    }

    pub fn authorization_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.raw.authorization_endpoint = Some(endpoint.into());
        self
    }

    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.raw.token_endpoint = Some(endpoint.into());
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<ClientConfiguration> {
        self.raw.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_builder_minimal() {
        let config = ClientConfiguration::builder()
            .client_id("c1")
            .redirect_uri("https://app/cb")
            .issuer("https://x")
            .build()
            .unwrap();

        assert_eq!(config.client_id(), "c1");
        assert!(config.scopes().is_empty());
        assert_eq!(config.client_secret(), None);
        assert_eq!(config.token_endpoint(), None);
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let err = ClientConfiguration::builder()
            .client_id("c1")
            .build()
            .unwrap_err();

        match err {
            SmartError::MissingConfiguration { fields } => {
                assert_eq!(fields, vec!["redirect_uri", "issuer"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = ClientConfiguration::builder()
            .client_id("  ")
            .redirect_uri("https://app/cb")
            .issuer("https://x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = ClientConfiguration::builder()
            .client_id("c1")
            .redirect_uri("not a url")
            .issuer("https://x")
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("redirect_uri"));
    }

    #[test]
    fn test_from_map_with_base_url_and_scope_string() {
        let config = ClientConfiguration::from_map(map(json!({
            "client_id": "c1",
            "redirect_uri": "https://app/cb",
            "base_url": "https://x",
            "scopes": "openid  launch/patient",
            "unrelated": 42
        })))
        .unwrap();

        assert_eq!(config.issuer(), "https://x");
        assert_eq!(config.scopes(), ["openid", "launch/patient"]);
    }

    #[test]
    fn test_blank_scope_entries_dropped() {
        let config = ClientConfiguration::builder()
            .client_id("c1")
            .redirect_uri("https://app/cb")
            .issuer("https://x")
            .scopes(["openid", "", "  ", " launch "])
            .build()
            .unwrap();
        assert_eq!(config.scopes(), ["openid", "launch"]);

        let config = ClientConfiguration::from_map(map(json!({
            "client_id": "c1",
            "redirect_uri": "https://app/cb",
            "issuer": "https://x",
            "scopes": ["   "]
        })))
        .unwrap();
        assert!(config.scopes().is_empty());
    }

    #[test]
    fn test_from_map_rejects_wrong_types() {
        let err = ClientConfiguration::from_map(map(json!({
            "client_id": 7,
            "redirect_uri": "https://app/cb",
            "issuer": "https://x"
        })))
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_from_toml() {
        let config = ClientConfiguration::from_toml_str(
            r#"
client_id = "c1"
client_secret = "s3cr3t"
redirect_uri = "https://app/cb"
issuer = "https://x/fhir"
token_endpoint = "https://x/token"
scopes = ["openid", "fhirUser"]
"#,
        )
        .unwrap();

        assert_eq!(config.client_secret(), Some("s3cr3t"));
        assert_eq!(config.token_endpoint(), Some("https://x/token"));
        assert_eq!(config.scopes().len(), 2);
    }

    #[test]
    fn test_env_overrides() {
        let raw = RawConfiguration::from_toml_str("client_id = \"file\"\nissuer = \"https://x\"")
            .unwrap()
            .with_overrides(vec![
                ("SMART_CLIENT_ID".to_string(), "env".to_string()),
                ("SMART_REDIRECT_URI".to_string(), "https://app/cb".to_string()),
                ("SMART_SCOPES".to_string(), "openid profile".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ]);

        let config = ClientConfiguration::try_from(raw).unwrap();
        assert_eq!(config.client_id(), "env");
        assert_eq!(config.scopes(), ["openid", "profile"]);
    }

    #[test]
    fn test_load_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("smart.toml");
        std::fs::write(
            &path,
            "client_id = \"c1\"\nredirect_uri = \"https://app/cb\"\nissuer = \"https://x\"\n",
        )
        .unwrap();

        let config = ClientConfiguration::load(&path).unwrap();
        assert_eq!(config.redirect_uri(), "https://app/cb");

        assert!(ClientConfiguration::load(&temp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ClientConfiguration::builder()
            .client_id("c1")
            .client_secret("hunter2")
            .redirect_uri("https://app/cb")
            .issuer("https://x")
            .build()
            .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[redacted]"));
    }
}
