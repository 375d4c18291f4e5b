// src/token.rs

use crate::error::SpotError;
use crate::jwks::{decode_base64url, JwksResolver};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use rsa::traits::PublicKeyParts;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, instrument};

/// An identity token issued by the Spot identity provider.
///
/// Construction parses the header and claims without checking the signature.
/// Each check below is independent; the provider configuration flow runs them
/// in the order expiry, verified email, signature, org id and aborts on the
/// first failure.
#[derive(Clone)]
pub struct SpotToken {
    raw: String,
    header: Header,
    claims: Map<String, Value>,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for SpotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotToken")
            .field("raw", &"[REDACTED]")
            .field("alg", &self.header.alg)
            .field("kid", &self.header.kid)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SpotToken {
    /// Decodes a compact JWT without verifying it.
    ///
    /// # Errors
    ///
    /// Returns [`SpotError::MalformedToken`] if the token is not three
    /// base64url segments with a JSON header and a JSON object payload, and
    /// [`SpotError::MissingExpiration`] if the `exp` claim is absent.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SpotError> {
        let raw = raw.into();
        let segments: Vec<&str> = raw.split('.').collect();
        let [_, payload, _] = segments.as_slice() else {
            return Err(SpotError::MalformedToken(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        let payload = decode_base64url(payload)
            .map_err(|e| SpotError::MalformedToken(format!("invalid claims encoding: {e}")))?;
        let claims: Map<String, Value> = serde_json::from_slice(&payload)
            .map_err(|e| SpotError::MalformedToken(format!("invalid claims: {e}")))?;
        let header =
            decode_header(&raw).map_err(|e| SpotError::MalformedToken(e.to_string()))?;
        let expires_at = expiration(&claims)?;

        Ok(Self {
            raw,
            header,
            claims,
            expires_at,
        })
    }

    /// The compact token exactly as it was received.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Consumes the token, returning the compact form.
    pub fn into_raw(self) -> String {
        self.raw
    }

    /// The signing algorithm declared in the header.
    pub fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    /// All claims of the token.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// The instant named by the `exp` claim.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The `org_id` claim, the anchor of every namespaced lookup.
    pub fn org_id(&self) -> Result<&str, SpotError> {
        match self.claims.get("org_id") {
            Some(Value::String(org_id)) => Ok(org_id),
            Some(_) => Err(SpotError::InvalidClaim("org_id".to_string())),
            None => Err(SpotError::MissingOrgId),
        }
    }

    /// The `iss` claim.
    pub fn issuer(&self) -> Result<&str, SpotError> {
        match self.claims.get("iss") {
            Some(Value::String(issuer)) => Ok(issuer),
            Some(_) => Err(SpotError::InvalidClaim("iss".to_string())),
            None => Err(SpotError::MissingIssuer),
        }
    }

    /// The `kid` header.
    pub fn key_id(&self) -> Result<&str, SpotError> {
        self.header.kid.as_deref().ok_or(SpotError::MissingKeyId)
    }

    /// Returns `true` if the token expired strictly before the current instant.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns `true` if the token expired strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Returns `false` only when `email_verified` is present and exactly `false`.
    ///
    /// Tokens minted before the identity provider added the claim do not carry
    /// it, so absence (or a non-boolean value) counts as verified.
    pub fn is_email_verified(&self) -> bool {
        !matches!(self.claims.get("email_verified"), Some(Value::Bool(false)))
    }

    /// Verifies the token signature against the issuer's published keys.
    ///
    /// The key set is fetched from `<iss>.well-known/jwks.json` and the key is
    /// selected by the header `kid`. The algorithm declared in the header is
    /// used for verification; the standard `exp` check is applied as well.
    #[instrument(skip(self, resolver), err)]
    pub async fn verify_signature(&self, resolver: &JwksResolver) -> Result<(), SpotError> {
        let kid = self.key_id()?;
        let issuer = self.issuer()?;

        let public_key = resolver.resolve(issuer, kid).await?;
        let decoding_key = DecodingKey::from_rsa_raw_components(
            &public_key.n().to_bytes_be(),
            &public_key.e().to_bytes_be(),
        );

        let mut validation = Validation::new(self.header.alg);
        // The identity token is not scoped to this provider as an audience.
        validation.validate_aud = false;

        decode::<Value>(&self.raw, &decoding_key, &validation)?;
        debug!("Token signature verified with kid {}", kid);
        Ok(())
    }
}

fn expiration(claims: &Map<String, Value>) -> Result<DateTime<Utc>, SpotError> {
    let exp = claims.get("exp").ok_or(SpotError::MissingExpiration)?;
    let seconds = exp
        .as_f64()
        .ok_or_else(|| SpotError::MalformedToken("'exp' claim is not numeric".to_string()))?;
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| SpotError::MalformedToken("'exp' claim is out of range".to_string()))
}
