//! Client façade.
//!
//! [`SmartClient`] owns the configuration, a shared discovery service and the
//! current client authentication mode. The [`ProtocolEngine`] is built on
//! first use and thrown away whenever the mode changes, so the next call
//! always runs under the mode that is current at that moment.
//!
//! # Example
//!
//! ```no_run
//! use smart_oauth::{AuthType, ClientConfiguration, SmartClient};
//!
//! # fn example() -> smart_oauth::Result<()> {
//! let config = ClientConfiguration::builder()
//!     .client_id("my-app")
//!     .redirect_uri("https://app.example.com/callback")
//!     .issuer("https://ehr.example.com/fhir")
//!     .scopes(["openid", "fhirUser", "launch/patient"])
//!     .build()?;
//!
//! let client = SmartClient::new(config)?;
//! let request = client.authorize_url(None, None)?;
//! // Redirect the user to `request.url`, keep `request.state` and
//! // `request.code_verifier` in the session, then on callback:
//! let tokens = client.request_access_token("code-from-callback", &request.code_verifier, None)?;
//! println!("expires in {:?}s", tokens.expires_in());
//!
//! client.set_auth_type(AuthType::ConfidentialSymmetric);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::config::ClientConfiguration;
use crate::discovery::DiscoveryService;
use crate::engine::{AuthType, AuthorizationRequest, ProtocolEngine};
use crate::error::{Result, SmartError};
use crate::metadata::ServerMetadata;
use crate::token::TokenResponse;
use crate::transport::{ReqwestTransport, SharedTransport};

/// Current mode and the engine built for it, swapped together.
#[derive(Debug)]
struct EngineSlot {
    auth_type: AuthType,
    engine: Option<Arc<ProtocolEngine>>,
}

/// SMART on FHIR authorization client.
#[derive(Debug)]
pub struct SmartClient {
    config: ClientConfiguration,
    transport: SharedTransport,
    discovery: Arc<DiscoveryService>,
    slot: Mutex<EngineSlot>,
}

impl SmartClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Public client over the default reqwest transport.
    pub fn new(config: ClientConfiguration) -> Result<Self> {
        Self::builder().configuration(config).build()
    }

    /// Public client from a raw key/value map.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        Self::builder().configuration_map(map).build()
    }

    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    pub fn auth_type(&self) -> AuthType {
        self.slot.lock().auth_type
    }

    /// Switch the client authentication mode and drop the cached engine.
    pub fn set_auth_type(&self, auth_type: AuthType) {
        let mut slot = self.slot.lock();
        tracing::debug!(from = %slot.auth_type, to = %auth_type, "Switching auth type");
        slot.auth_type = auth_type;
        slot.engine = None;
    }

    /// Parse and apply a mode given by its wire name, e.g. `"public"`.
    pub fn set_auth_type_str(&self, value: &str) -> Result<()> {
        let auth_type = value.parse()?;
        self.set_auth_type(auth_type);
        Ok(())
    }

    /// Engine for the current mode, built on first use.
    pub fn engine(&self) -> Result<Arc<ProtocolEngine>> {
        let mut slot = self.slot.lock();
        if let Some(engine) = slot.engine.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let engine = Arc::new(ProtocolEngine::with_discovery(
            self.config.clone(),
            slot.auth_type,
            Arc::clone(&self.transport),
            Arc::clone(&self.discovery),
        )?);
        slot.engine = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Server metadata, discovered once for the lifetime of this client.
    pub fn metadata(&self) -> Result<Arc<ServerMetadata>> {
        self.engine()?.metadata()
    }

    /// Pick a mode from what the server declares and apply it.
    ///
    /// Prefers `confidential_symmetric` when a secret is configured and the
    /// server declares `client-confidential-symmetric`, then `public` when it
    /// declares `client-public`.
    pub fn negotiate_auth_type(&self) -> Result<AuthType> {
        let metadata = self.metadata()?;
        let has_secret = self.config.client_secret().is_some();

        let auth_type = if has_secret && metadata.supports_confidential_symmetric() {
            AuthType::ConfidentialSymmetric
        } else if metadata.supports_public_clients() {
            AuthType::Public
        } else {
            return Err(SmartError::Configuration(format!(
                "no supported client authentication mode (server capabilities: {}, client secret configured: {})",
                metadata.capabilities().join(", "),
                has_secret
            )));
        };

        tracing::info!(auth_type = %auth_type, "Negotiated client authentication");
        self.set_auth_type(auth_type);
        Ok(auth_type)
    }

    pub fn authorize_url(
        &self,
        launch: Option<&str>,
        custom_scopes: Option<&[String]>,
    ) -> Result<AuthorizationRequest> {
        self.engine()?.build_authorization_url(launch, custom_scopes)
    }

    pub fn request_access_token(
        &self,
        code: &str,
        code_verifier: &str,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse> {
        self.engine()?
            .request_access_token(code, code_verifier, client_secret)
    }

    pub fn refresh_access_token(
        &self,
        refresh_token: &str,
        scopes: Option<&[String]>,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse> {
        self.engine()?
            .refresh_access_token(refresh_token, scopes, client_secret)
    }
}

/// Builder for [`SmartClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    config: Option<ClientConfiguration>,
    config_map: Option<Map<String, Value>>,
    auth_type: AuthType,
    transport: Option<SharedTransport>,
    enforce_required_fields: bool,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            config_map: None,
            auth_type: AuthType::default(),
            transport: None,
            enforce_required_fields: true,
        }
    }

    /// Validated configuration. Cannot be combined with [`Self::configuration_map`].
    pub fn configuration(mut self, config: ClientConfiguration) -> Self {
        self.config = Some(config);
        self
    }

    /// Raw key/value configuration, normalized at build time. Cannot be
    /// combined with [`Self::configuration`].
    pub fn configuration_map(mut self, map: Map<String, Value>) -> Self {
        self.config_map = Some(map);
        self
    }

    pub fn auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    /// Use a custom transport instead of the default reqwest one.
    pub fn transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Whether discovery rejects documents missing required fields (default: true).
    pub fn enforce_required_fields(mut self, enforce: bool) -> Self {
        self.enforce_required_fields = enforce;
        self
    }

    pub fn build(self) -> Result<SmartClient> {
        let config = match (self.config, self.config_map) {
            (Some(_), Some(_)) => {
                return Err(SmartError::Configuration(
                    "set either a configuration or a configuration map, not both".to_string(),
                ));
            }
            (Some(config), None) => config,
            (None, Some(map)) => ClientConfiguration::from_map(map)?,
            (None, None) => {
                return Err(SmartError::Configuration(
                    "client configuration is required".to_string(),
                ));
            }
        };

        let transport: SharedTransport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        let discovery = Arc::new(
            DiscoveryService::new(config.issuer(), Arc::clone(&transport))
                .enforce_required_fields(self.enforce_required_fields),
        );

        Ok(SmartClient {
            config,
            transport,
            discovery,
            slot: Mutex::new(EngineSlot {
                auth_type: self.auth_type,
                engine: None,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
