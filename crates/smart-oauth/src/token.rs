//! Token endpoint responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body returned by the token endpoint.
///
/// Kept as the unmodified JSON object the server sent; the accessors are
/// conveniences over well-known keys. Only a non-empty `access_token` is
/// guaranteed, and deserialization enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct TokenResponse(Map<String, Value>);

impl TryFrom<Map<String, Value>> for TokenResponse {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_map(map)
            .map_err(|_| "token response is missing a non-empty access_token".to_string())
    }
}

impl From<TokenResponse> for Map<String, Value> {
    fn from(tokens: TokenResponse) -> Self {
        tokens.0
    }
}

impl TokenResponse {
    /// Wrap a decoded object, returning it back if `access_token` is absent or empty.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, Map<String, Value>> {
        let has_token = map
            .get("access_token")
            .and_then(Value::as_str)
            .is_some_and(|token| !token.is_empty());
        if has_token {
            Ok(Self(map))
        } else {
            Err(map)
        }
    }

    pub fn access_token(&self) -> &str {
        self.str_field("access_token").unwrap_or_default()
    }

    pub fn token_type(&self) -> Option<&str> {
        self.str_field("token_type")
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.str_field("refresh_token")
    }

    pub fn id_token(&self) -> Option<&str> {
        self.str_field("id_token")
    }

    /// Lifetime in seconds. Some servers send it as a string.
    pub fn expires_in(&self) -> Option<u64> {
        match self.0.get("expires_in")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Granted scopes, split on whitespace.
    pub fn scopes(&self) -> Vec<&str> {
        self.str_field("scope")
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Patient in context, if the launch carried one.
    pub fn patient(&self) -> Option<&str> {
        self.str_field("patient")
    }

    pub fn encounter(&self) -> Option<&str> {
        self.str_field("encounter")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_requires_access_token() {
        assert!(TokenResponse::from_map(object(json!({"token_type": "Bearer"}))).is_err());
        assert!(TokenResponse::from_map(object(json!({"access_token": ""}))).is_err());
        assert!(TokenResponse::from_map(object(json!({"access_token": 5}))).is_err());
    }

    #[test]
    fn test_deserialize_requires_access_token() {
        let err = serde_json::from_value::<TokenResponse>(json!({"token_type": "Bearer"}))
            .unwrap_err();
        assert!(err.to_string().contains("access_token"));
        assert!(serde_json::from_value::<TokenResponse>(json!({"access_token": ""})).is_err());

        let tokens: TokenResponse =
            serde_json::from_value(json!({"access_token": "tok", "extra": 1})).unwrap();
        assert_eq!(tokens.access_token(), "tok");
        assert_eq!(tokens.get("extra"), Some(&json!(1)));
    }

    #[test]
    fn test_accessors() {
        let response = TokenResponse::from_map(object(json!({
            "access_token": "tok",
            "token_type": "Bearer",
            "expires_in": "3600",
            "scope": "openid launch/patient",
            "refresh_token": "r1",
            "patient": "123",
            "need_patient_banner": true
        })))
        .unwrap();

        assert_eq!(response.access_token(), "tok");
        assert_eq!(response.expires_in(), Some(3600));
        assert_eq!(response.scopes(), vec!["openid", "launch/patient"]);
        assert_eq!(response.refresh_token(), Some("r1"));
        assert_eq!(response.patient(), Some("123"));
        assert_eq!(response.encounter(), None);
        assert_eq!(response.get("need_patient_banner"), Some(&json!(true)));
    }

    #[test]
    fn test_serializes_unchanged() {
        let body = json!({"access_token": "tok", "custom": {"a": 1}});
        let response = TokenResponse::from_map(object(body.clone())).unwrap();
        assert_eq!(serde_json::to_value(&response).unwrap(), body);
    }
}
