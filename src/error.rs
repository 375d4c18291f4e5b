// src/error.rs

use base64::DecodeError;
use thiserror::Error;

use crate::readiness::ReadinessError;

/// The primary error type for the `spot-provider-core` library.
///
/// Every variant except [`SpotError::Readiness`] is fatal for provider
/// configuration: callers surface it and stop, nothing here is retried.
#[derive(Debug, Error)]
pub enum SpotError {
    /// Errors originating from the `jsonwebtoken` crate during signature verification.
    #[error("JWT validation error: {0}")]
    JwtValidation(#[from] jsonwebtoken::errors::Error),

    /// An error occurred during an HTTP request.
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No refresh token was supplied through the settings or the environment.
    #[error("Missing authentication token: set RXTSPOT_TOKEN or RXTSPOT_TOKEN_FILE")]
    MissingToken,

    /// The refresh token file could not be read.
    #[error("Failed to read authentication token from {path}: {source}")]
    TokenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The token is not a structurally valid compact JWT.
    #[error("Failed to parse token: {0}")]
    MalformedToken(String),

    /// The token carries no usable `exp` claim.
    #[error("Failed to parse token: the 'exp' claim is required")]
    MissingExpiration,

    /// The token's `exp` claim lies in the past.
    #[error("Token is expired, please use a valid token")]
    TokenExpired,

    /// The identity provider reports the account email as unverified.
    #[error("Email is not verified, please verify your email to use Spot services")]
    EmailNotVerified,

    /// The token has no `org_id` claim.
    #[error("org_id not found in token")]
    MissingOrgId,

    /// A claim is present but has an unexpected JSON type.
    #[error("Claim '{0}' is not of string type")]
    InvalidClaim(String),

    /// The token has no `iss` claim, so the JWKS location cannot be derived.
    #[error("The token is missing the 'iss' (issuer) claim")]
    MissingIssuer,

    /// The JWT header is missing the required 'kid' (Key ID) field.
    #[error("The JWT header is missing the 'kid' (Key ID) field")]
    MissingKeyId,

    /// No RSA key with the requested 'kid' exists in the JSON Web Key Set.
    #[error("public key not found for kid: {0}")]
    KeyNotFound(String),

    /// A cryptographic key (JWK component) is malformed or invalid.
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// An error occurred while decoding a Base64URL encoded string.
    #[error("Base64URL decoding error: {0}")]
    Base64DecodeError(#[from] DecodeError),

    /// The token endpoint rejected the grant with an RFC 6749 error response.
    #[error("Token endpoint rejected the refresh token: {0}")]
    TokenEndpoint(String),

    /// The token request failed before a usable response arrived.
    #[error("Token request failed: {0}")]
    TokenRequest(String),

    /// The discovery document describes a different issuer than the one requested.
    #[error("Discovery document issuer '{actual}' does not match '{expected}'")]
    IssuerMismatch { expected: String, actual: String },

    /// The token endpoint response carried no `id_token` extra field.
    #[error("id token not found in token endpoint response")]
    MissingIdToken,

    /// No client application with the configured name was found in the directory.
    #[error("Identity provider client application '{0}' not found")]
    IdentityProviderNotFound(String),

    /// The client application directory lookup failed.
    ///
    /// Returned by [`ClientAppDirectory`](crate::exchange::ClientAppDirectory)
    /// implementations backed by the organizer API.
    #[error("Client application directory lookup failed: {0}")]
    Directory(String),

    /// A readiness wait ended without the resource becoming ready.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),
}
