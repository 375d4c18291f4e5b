// src/jwks.rs

use crate::error::SpotError;
use crate::model::{JsonWebKey, JsonWebKeySet};
use base64::engine::{general_purpose::STANDARD, Engine};
use rsa::{BigUint, RsaPublicKey};
use tracing::{debug, instrument};

/// Path appended verbatim to the issuer to locate its signing keys.
pub const JWKS_WELL_KNOWN_SUFFIX: &str = ".well-known/jwks.json";

/// Builds the JWKS location for an issuer.
///
/// The issuer is used as-is, so an issuer of `https://example.auth0.com/`
/// yields `https://example.auth0.com/.well-known/jwks.json`.
pub fn jwks_url(issuer: &str) -> String {
    format!("{issuer}{JWKS_WELL_KNOWN_SUFFIX}")
}

/// Decodes a base64url string by rewriting it into the standard alphabet.
///
/// `-` becomes `+`, `_` becomes `/`, and `=` padding is added until the length
/// is a multiple of four.
pub fn decode_base64url(input: &str) -> Result<Vec<u8>, SpotError> {
    let mut standard: String = input
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    match standard.len() % 4 {
        2 => standard.push_str("=="),
        3 => standard.push('='),
        _ => {}
    }
    Ok(STANDARD.decode(standard)?)
}

impl JsonWebKey {
    /// Builds an RSA public key from the `n` and `e` components.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, SpotError> {
        let n = self.n.as_deref().ok_or_else(|| {
            SpotError::InvalidKeyFormat("RSA key missing 'n' component".to_string())
        })?;
        let e = self.e.as_deref().ok_or_else(|| {
            SpotError::InvalidKeyFormat("RSA key missing 'e' component".to_string())
        })?;

        let modulus = decode_base64url(n).map_err(|e| {
            SpotError::InvalidKeyFormat(format!("error decoding public key modulus: {e}"))
        })?;
        let exponent = decode_base64url(e).map_err(|e| {
            SpotError::InvalidKeyFormat(format!("error decoding public key exponent: {e}"))
        })?;

        RsaPublicKey::new(
            BigUint::from_bytes_be(&modulus),
            BigUint::from_bytes_be(&exponent),
        )
        .map_err(|e| SpotError::InvalidKeyFormat(e.to_string()))
    }
}

impl JsonWebKeySet {
    /// Returns the first RSA key whose `kid` matches.
    pub fn find_rsa_key(&self, kid: &str) -> Result<&JsonWebKey, SpotError> {
        self.keys
            .iter()
            .find(|jwk| jwk.kty == "RSA" && jwk.kid == kid)
            .ok_or_else(|| SpotError::KeyNotFound(kid.to_string()))
    }
}

/// Fetches an issuer's signing keys and extracts the RSA key for a `kid`.
///
/// Nothing is cached: each call performs one GET against the issuer.
#[derive(Clone, Default)]
pub struct JwksResolver {
    http_client: reqwest::Client,
}

impl JwksResolver {
    /// Creates a resolver with a default HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver that shares an existing HTTP client.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Downloads and parses a JSON Web Key Set.
    #[instrument(skip(self), err)]
    pub async fn fetch_key_set(&self, url: &str) -> Result<JsonWebKeySet, SpotError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        let jwks: JsonWebKeySet = response.json().await?;
        debug!("Fetched {} keys from {}", jwks.keys.len(), url);
        Ok(jwks)
    }

    /// Resolves the RSA public key that signed tokens with the given `kid`.
    #[instrument(skip(self), err)]
    pub async fn resolve(&self, issuer: &str, kid: &str) -> Result<RsaPublicKey, SpotError> {
        let jwks = self.fetch_key_set(&jwks_url(issuer)).await?;
        jwks.find_rsa_key(kid)?.to_rsa_public_key()
    }
}
