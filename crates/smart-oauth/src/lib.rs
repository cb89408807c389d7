//! SMART on FHIR OAuth 2.0 client.
//!
//! Discovers an authorization server through its
//! `/.well-known/smart-configuration` document, builds PKCE-protected
//! authorization requests, and exchanges authorization codes and refresh
//! tokens. The request shape at the token endpoint follows the client
//! authentication mode: public clients send `client_id` in the body,
//! confidential-symmetric clients authenticate with HTTP Basic.
//!
//! # Components
//!
//! - [`pkce`] — verifier generation, S256 challenge derivation, validation
//! - [`metadata`] — typed SMART configuration and capability rules
//! - [`discovery`] — fetch and cache the configuration document
//! - [`engine`] — authorization URL, code exchange and refresh
//! - [`client`] — façade with lazy discovery and mode switching
//! - [`transport`] — injected HTTP collaborator (reqwest and in-memory)
//! - [`config`] — client configuration from builder, map, TOML or env

pub mod client;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod pkce;
pub mod token;
pub mod transport;

pub use client::{ClientBuilder, SmartClient};
pub use config::{ClientConfiguration, ConfigurationBuilder, RawConfiguration};
pub use discovery::DiscoveryService;
pub use engine::{AuthType, AuthorizationRequest, Endpoints, ProtocolEngine};
pub use error::{ErrorKind, Result, SmartError};
pub use metadata::ServerMetadata;
pub use pkce::Pkce;
pub use token::TokenResponse;
pub use transport::{
    HttpResponse, HttpTransport, ReqwestTransport, SharedTransport, StaticTransport, TransportError,
};
