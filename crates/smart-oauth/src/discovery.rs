//! SMART configuration discovery.
//!
//! Fetches `<issuer>/.well-known/smart-configuration` once and keeps the
//! parsed [`ServerMetadata`] for the lifetime of the service.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Result, SmartError, truncate_body};
use crate::metadata::ServerMetadata;
use crate::transport::SharedTransport;

/// Path of the discovery document relative to the issuer.
pub const WELL_KNOWN_PATH: &str = "/.well-known/smart-configuration";

/// Discovery URL for an issuer, ignoring any trailing slash on the issuer.
pub fn well_known_url(issuer: &str) -> String {
    format!("{}{}", issuer.trim_end_matches('/'), WELL_KNOWN_PATH)
}

/// Fetches and caches the SMART configuration of one issuer.
#[derive(Debug)]
pub struct DiscoveryService {
    issuer: String,
    transport: SharedTransport,
    enforce_required_fields: bool,
    cached: Mutex<Option<Arc<ServerMetadata>>>,
}

impl DiscoveryService {
    /// Create a service that rejects documents missing required fields.
    pub fn new(issuer: impl Into<String>, transport: SharedTransport) -> Self {
        Self {
            issuer: issuer.into(),
            transport,
            enforce_required_fields: true,
            cached: Mutex::new(None),
        }
    }

    /// Toggle required-field enforcement. When off, incomplete documents are
    /// returned and callers check [`ServerMetadata::is_valid`] themselves.
    pub fn enforce_required_fields(mut self, enforce: bool) -> Self {
        self.enforce_required_fields = enforce;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn endpoint(&self) -> String {
        well_known_url(&self.issuer)
    }

    /// Whether a document has already been fetched.
    pub fn is_cached(&self) -> bool {
        self.cached.lock().is_some()
    }

    /// Return the cached document, fetching it on first use.
    ///
    /// The cache slot stays locked during the fetch, so concurrent first
    /// callers share a single request.
    pub fn metadata(&self) -> Result<Arc<ServerMetadata>> {
        let mut slot = self.cached.lock();
        if let Some(metadata) = slot.as_ref() {
            return Ok(Arc::clone(metadata));
        }

        let endpoint = self.endpoint();
        let metadata = match self.fetch(&endpoint) {
            Ok(metadata) => Arc::new(metadata),
            Err(e) => {
                tracing::error!(endpoint = %endpoint, error = %e, "SMART configuration discovery failed");
                return Err(e);
            }
        };

        tracing::info!(
            endpoint = %endpoint,
            capabilities = ?metadata.capabilities(),
            "Discovered SMART configuration"
        );
        *slot = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    fn fetch(&self, endpoint: &str) -> Result<ServerMetadata> {
        tracing::debug!(endpoint = %endpoint, "Fetching SMART configuration");

        let response = self
            .transport
            .get(endpoint)
            .and_then(|r| r.error_for_status())
            .map_err(|e| SmartError::Discovery {
                endpoint: endpoint.to_string(),
                status: e.status(),
                message: format!("request failed: {}", truncate_body(e.body())),
            })?;

        let value: Value = serde_json::from_str(&response.body).map_err(|e| {
            SmartError::discovery(
                endpoint,
                format!("invalid JSON ({}): {}", e, truncate_body(&response.body)),
            )
        })?;

        let Value::Object(map) = value else {
            return Err(SmartError::discovery(
                endpoint,
                format!(
                    "response is not a JSON object: {}",
                    truncate_body(&response.body)
                ),
            ));
        };

        let metadata = ServerMetadata::from_map(map).map_err(|e| {
            SmartError::discovery(endpoint, format!("invalid SMART configuration: {}", e))
        })?;

        if self.enforce_required_fields {
            let missing = metadata.missing_fields();
            if !missing.is_empty() {
                return Err(SmartError::discovery(
                    endpoint,
                    format!("missing required fields: {}", missing.join(", ")),
                ));
            }
        }

        Ok(metadata)
    }
}
