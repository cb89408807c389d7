//! Authorization-code protocol engine.
//!
//! A [`ProtocolEngine`] is bound to one configuration and one client
//! authentication mode. It builds PKCE-protected authorization URLs and runs
//! the code and refresh grants against the token endpoint, shaping each
//! request according to the mode:
//!
//! | Mode                     | `client_id` in body | `Authorization` header          |
//! |--------------------------|---------------------|---------------------------------|
//! | `public`                 | yes                 | none                            |
//! | `confidential_symmetric` | no                  | `Basic base64(client_id:secret)` |
//!
//! Endpoints missing from the configuration are resolved through discovery
//! on first need and stay fixed afterwards.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ClientConfiguration;
use crate::discovery::DiscoveryService;
use crate::error::{Result, SmartError, truncate_body};
use crate::metadata::ServerMetadata;
use crate::pkce::{self, Pkce};
use crate::token::TokenResponse;
use crate::transport::{Headers, SharedTransport};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Bytes of randomness behind each `state` value (32 hex characters).
const STATE_BYTES: usize = 16;

// ============================================================================
// AuthType
// ============================================================================

/// How the client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// PKCE only; `client_id` travels in the request body.
    #[default]
    Public,
    /// Shared secret sent with HTTP Basic authentication.
    ConfidentialSymmetric,
    /// Signed JWT client assertion. Reserved; token requests are rejected.
    ConfidentialAsymmetric,
}

impl AuthType {
    pub const ALL: [AuthType; 3] = [
        AuthType::Public,
        AuthType::ConfidentialSymmetric,
        AuthType::ConfidentialAsymmetric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Public => "public",
            AuthType::ConfidentialSymmetric => "confidential_symmetric",
            AuthType::ConfidentialAsymmetric => "confidential_asymmetric",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = SmartError;

    fn from_str(s: &str) -> Result<Self> {
        AuthType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SmartError::InvalidAuthType {
                value: s.to_string(),
                valid: AuthType::ALL.iter().map(AuthType::as_str).collect(),
            })
    }
}

// ============================================================================
// Request/response types
// ============================================================================

/// OAuth endpoints the engine talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: String,
}

/// A composed authorization request.
///
/// The caller must keep `state` and `code_verifier` (typically in session
/// storage) until the redirect comes back; the engine does not retain them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

/// Generate a 32-character hex `state` value.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// ProtocolEngine
// ============================================================================

/// Authorization and token client for one configuration and auth mode.
#[derive(Debug)]
pub struct ProtocolEngine {
    config: ClientConfiguration,
    auth_type: AuthType,
    transport: SharedTransport,
    discovery: Arc<DiscoveryService>,
    endpoints: Mutex<Option<Endpoints>>,
}

impl ProtocolEngine {
    /// Create an engine with its own discovery service for the configured issuer.
    pub fn new(
        config: ClientConfiguration,
        auth_type: AuthType,
        transport: SharedTransport,
    ) -> Result<Self> {
        let discovery = Arc::new(DiscoveryService::new(
            config.issuer(),
            Arc::clone(&transport),
        ));
        Self::with_discovery(config, auth_type, transport, discovery)
    }

    /// Create an engine sharing an existing discovery service.
    pub fn with_discovery(
        config: ClientConfiguration,
        auth_type: AuthType,
        transport: SharedTransport,
        discovery: Arc<DiscoveryService>,
    ) -> Result<Self> {
        config.validate()?;
        if discovery.issuer().trim_end_matches('/') != config.issuer().trim_end_matches('/') {
            return Err(SmartError::Configuration(format!(
                "discovery issuer '{}' does not match configured issuer '{}'",
                discovery.issuer(),
                config.issuer()
            )));
        }

        Ok(Self {
            config,
            auth_type,
            transport,
            discovery,
            endpoints: Mutex::new(None),
        })
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    /// Discovered server metadata, fetched on first call.
    pub fn metadata(&self) -> Result<Arc<ServerMetadata>> {
        self.discovery.metadata()
    }

    /// Resolved endpoints. Configured values win; anything missing comes from
    /// discovery. Resolution happens once.
    pub fn endpoints(&self) -> Result<Endpoints> {
        let mut slot = self.endpoints.lock();
        if let Some(endpoints) = slot.as_ref() {
            return Ok(endpoints.clone());
        }

        let endpoints = match (
            self.config.authorization_endpoint(),
            self.config.token_endpoint(),
        ) {
            (Some(authorize), Some(token)) => Endpoints {
                authorization_endpoint: Some(authorize.to_string()),
                token_endpoint: token.to_string(),
            },
            (authorize, token) => {
                let metadata = self.discovery.metadata()?;
                self.check_issuer(&metadata);

                let token_endpoint = token
                    .map(str::to_string)
                    .or_else(|| metadata.token_endpoint.clone())
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        SmartError::Configuration(
                            "token_endpoint is not configured and was not discovered".to_string(),
                        )
                    })?;

                Endpoints {
                    authorization_endpoint: authorize
                        .map(str::to_string)
                        .or_else(|| metadata.authorization_endpoint.clone())
                        .filter(|a| !a.is_empty()),
                    token_endpoint,
                }
            }
        };

        *slot = Some(endpoints.clone());
        Ok(endpoints)
    }

    fn check_issuer(&self, metadata: &ServerMetadata) {
        if let Some(issuer) = metadata.issuer.as_deref() {
            if issuer.trim_end_matches('/') != self.config.issuer().trim_end_matches('/') {
                tracing::warn!(
                    configured = %self.config.issuer(),
                    discovered = %issuer,
                    "Discovered issuer differs from configured issuer"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────────────

    /// Build the authorization URL for a new attempt.
    ///
    /// `custom_scopes` replaces the configured scopes when it holds at least
    /// one non-blank entry. Blank entries are dropped. Each call generates a
    /// fresh state and PKCE pair.
    pub fn build_authorization_url(
        &self,
        launch: Option<&str>,
        custom_scopes: Option<&[String]>,
    ) -> Result<AuthorizationRequest> {
        let chosen = match custom_scopes {
            Some(scopes) if scopes.iter().any(|s| !s.trim().is_empty()) => scopes,
            _ => self.config.scopes(),
        };
        let scopes: Vec<&str> = chosen
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if scopes.is_empty() {
            return Err(SmartError::Configuration(
                "at least one scope is required to build an authorization request".to_string(),
            ));
        }

        let authorize = self.endpoints()?.authorization_endpoint.ok_or_else(|| {
            SmartError::Configuration(
                "authorization_endpoint is not configured and was not discovered".to_string(),
            )
        })?;

        let pkce = Pkce::generate();
        let state = generate_state();
        let scope = scopes.join(" ");

        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id()),
            ("redirect_uri", self.config.redirect_uri()),
            ("launch", launch.unwrap_or_default()),
            ("scope", scope.as_str()),
            ("state", state.as_str()),
            ("aud", self.config.issuer()),
            ("code_challenge_method", pkce.method()),
            ("code_challenge", pkce.challenge()),
        ];

        let query = params
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if authorize.contains('?') { '&' } else { '?' };
        let url = format!("{}{}{}", authorize, separator, query);

        tracing::debug!(
            endpoint = %authorize,
            launch = launch.is_some(),
            scope = %scope,
            "Built authorization URL"
        );

        Ok(AuthorizationRequest {
            url,
            state,
            code_verifier: pkce.verifier().to_string(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Token endpoint
    // ─────────────────────────────────────────────────────────────────────

    /// Exchange an authorization code for tokens.
    ///
    /// `client_secret` overrides the configured secret in
    /// `confidential_symmetric` mode and is ignored in `public` mode.
    pub fn request_access_token(
        &self,
        code: &str,
        code_verifier: &str,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse> {
        pkce::validate_verifier(code_verifier)?;

        let form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.config.redirect_uri().to_string()),
            ("code_verifier", code_verifier.to_string()),
        ];
        self.token_request("authorization_code", form, client_secret)
    }

    /// Refresh an access token.
    ///
    /// `scope` is sent only when `scopes` is non-empty; otherwise the server
    /// keeps the originally granted scopes.
    pub fn refresh_access_token(
        &self,
        refresh_token: &str,
        scopes: Option<&[String]>,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse> {
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        if let Some(scopes) = scopes.filter(|s| !s.is_empty()) {
            form.push(("scope", scopes.join(" ")));
        }
        self.token_request("refresh_token", form, client_secret)
    }

    fn token_request(
        &self,
        grant_type: &str,
        mut form: Vec<(&'static str, String)>,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse> {
        let mut headers: Headers = vec![
            ("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        self.authenticate(&mut form, &mut headers, client_secret)?;

        let endpoint = self.endpoints()?.token_endpoint;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form.iter().filter(|(_, v)| !v.is_empty()))
            .finish();

        tracing::debug!(
            endpoint = %endpoint,
            grant_type,
            auth_type = %self.auth_type,
            "Sending token request"
        );

        let response = self
            .transport
            .post(&endpoint, &body, &headers)
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::warn!(
                    endpoint = %endpoint,
                    grant_type,
                    status = ?e.status(),
                    "Token request failed"
                );
                SmartError::Auth {
                    endpoint: endpoint.clone(),
                    status: e.status(),
                    message: format!("{} grant failed: {}", grant_type, truncate_body(e.body())),
                }
            })?;

        let value: Value = serde_json::from_str(&response.body).map_err(|e| {
            SmartError::auth(
                &endpoint,
                format!("invalid JSON ({}): {}", e, truncate_body(&response.body)),
            )
        })?;
        let Value::Object(map) = value else {
            return Err(SmartError::auth(
                &endpoint,
                format!(
                    "token response is not a JSON object: {}",
                    truncate_body(&response.body)
                ),
            ));
        };

        let tokens = TokenResponse::from_map(map).map_err(|_| {
            SmartError::auth(&endpoint, "token response did not include an access_token")
        })?;

        tracing::info!(
            grant_type,
            expires_in = ?tokens.expires_in(),
            has_refresh_token = tokens.refresh_token().is_some(),
            "Token request succeeded"
        );
        Ok(tokens)
    }

    /// Apply the mode-specific client authentication to a token request.
    fn authenticate(
        &self,
        form: &mut Vec<(&'static str, String)>,
        headers: &mut Headers,
        client_secret: Option<&str>,
    ) -> Result<()> {
        match self.auth_type {
            AuthType::Public => {
                form.push(("client_id", self.config.client_id().to_string()));
                Ok(())
            }
            AuthType::ConfidentialSymmetric => {
                let secret = client_secret
                    .filter(|s| !s.is_empty())
                    .or(self.config.client_secret())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        SmartError::Configuration(
                            "client_secret is required for confidential_symmetric clients"
                                .to_string(),
                        )
                    })?;
                let credentials =
                    STANDARD.encode(format!("{}:{}", self.config.client_id(), secret));
                headers.push(("Authorization".to_string(), format!("Basic {}", credentials)));
                Ok(())
            }
            AuthType::ConfidentialAsymmetric => Err(SmartError::Configuration(
                "confidential_asymmetric client authentication is not implemented".to_string(),
            )),
        }
    }
}
