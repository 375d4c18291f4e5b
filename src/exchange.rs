// src/exchange.rs

use crate::error::SpotError;
use crate::model::OidcDiscoveryDocument;
use async_trait::async_trait;
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AuthType, Client, ClientId, EndpointNotSet, EndpointSet, ExtraTokenFields, RefreshToken,
    RequestTokenError, Scope, StandardRevocableToken, StandardTokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

/// Scopes requested on every refresh. `offline_access` keeps the refresh
/// token usable for later exchanges.
pub const DEFAULT_SCOPES: [&str; 4] = ["openid", "profile", "email", "offline_access"];

/// Path appended to the issuer, after its trailing slash is removed, to find
/// the discovery document.
pub const DISCOVERY_SUFFIX: &str = "/.well-known/openid-configuration";

/// The non-standard token-response fields this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

/// A token-endpoint response carrying an optional `id_token`.
pub type IdTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type RefreshClient = Client<
    BasicErrorResponse,
    IdTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// OAuth2 client settings for the refresh-token grant.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    /// The client ID of the identity provider application.
    pub client_id: String,
    /// The authorization server's token endpoint.
    pub token_endpoint: Url,
    /// Scopes sent with the grant.
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    /// Creates a configuration requesting [`DEFAULT_SCOPES`].
    pub fn new(client_id: impl Into<String>, token_endpoint: Url) -> Self {
        Self {
            client_id: client_id.into(),
            token_endpoint,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replaces the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// A public client: no secret, `client_id` sent in the request body.
    fn oauth_client(&self) -> RefreshClient {
        Client::new(ClientId::new(self.client_id.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(TokenUrl::from_url(self.token_endpoint.clone()))
    }
}

/// Builds `<issuer without trailing slash>/.well-known/openid-configuration`.
///
/// Path segments of the issuer are kept, so `https://host/tenant` is
/// discovered at `https://host/tenant/.well-known/openid-configuration`.
pub fn discovery_url(issuer: &Url) -> Result<Url, SpotError> {
    let base = issuer.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}{DISCOVERY_SUFFIX}")).map_err(|e| SpotError::InvalidUrl(e.to_string()))
}

fn same_issuer(requested: &Url, advertised: &str) -> bool {
    requested.as_str().trim_end_matches('/') == advertised.trim_end_matches('/')
}

/// Looks up an issuer's OpenID Connect discovery document.
#[derive(Clone, Default)]
pub struct OidcDiscovery {
    http_client: reqwest::Client,
}

impl OidcDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Fetches the discovery document and checks that it describes `issuer`.
    ///
    /// # Errors
    ///
    /// Returns [`SpotError::IssuerMismatch`] if the document's `issuer`
    /// differs from the requested one, ignoring trailing slashes.
    #[instrument(skip(self), fields(issuer = %issuer), err)]
    pub async fn discover(&self, issuer: &Url) -> Result<OidcDiscoveryDocument, SpotError> {
        let discovery_url = discovery_url(issuer)?;

        debug!("Performing OIDC discovery at: {}", discovery_url);
        let document: OidcDiscoveryDocument = self
            .http_client
            .get(discovery_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !same_issuer(issuer, &document.issuer) {
            warn!(advertised = %document.issuer, "Discovery document names another issuer");
            return Err(SpotError::IssuerMismatch {
                expected: issuer.to_string(),
                actual: document.issuer,
            });
        }
        Ok(document)
    }

    /// Discovers the token endpoint and builds a client configuration for it.
    pub async fn client_config(
        &self,
        issuer: &Url,
        client_id: &str,
    ) -> Result<OAuthClientConfig, SpotError> {
        let document = self.discover(issuer).await?;
        let token_endpoint = Url::parse(&document.token_endpoint)
            .map_err(|e| SpotError::InvalidUrl(e.to_string()))?;
        debug!("Discovered token endpoint: {}", token_endpoint);
        Ok(OAuthClientConfig::new(client_id, token_endpoint))
    }
}

/// Trades a long-lived refresh token for a short-lived identity token.
#[derive(Clone)]
pub struct TokenExchanger {
    http_client: reqwest::Client,
    config: OAuthClientConfig,
}

impl TokenExchanger {
    pub fn new(config: OAuthClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http_client: reqwest::Client, config: OAuthClientConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    /// Performs the refresh-token grant and returns the `id_token` field.
    ///
    /// The identity provider's access token is opaque to the resource API; the
    /// identity token returned alongside it is what the API accepts.
    #[instrument(skip(self, refresh_token), fields(client_id = %self.config.client_id), err)]
    pub async fn exchange(&self, refresh_token: &str) -> Result<String, SpotError> {
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let response = self
            .config
            .oauth_client()
            .exchange_refresh_token(&refresh_token)
            .add_scopes(self.config.scopes.iter().cloned().map(Scope::new))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    let mut message = response.error().to_string();
                    if let Some(description) = response.error_description() {
                        message = format!("{message}: {description}");
                    }
                    warn!("Token endpoint rejected the refresh token: {}", message);
                    SpotError::TokenEndpoint(message)
                }
                other => SpotError::TokenRequest(other.to_string()),
            })?;

        response
            .extra_fields()
            .id_token
            .clone()
            .ok_or(SpotError::MissingIdToken)
    }
}

/// A client application record from the organizer directory.
///
/// Every field is optional on the wire; records missing any of them are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientApp {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// The identity-provider application that issues Spot tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProviderApp {
    pub client_id: String,
    pub issuer_url: Url,
}

/// The directory listing identity-provider client applications.
#[async_trait]
pub trait ClientAppDirectory: Send + Sync {
    async fn client_apps(&self) -> Result<Vec<ClientApp>, SpotError>;
}

/// Picks the application named `app_name` and derives its issuer URL.
///
/// Incomplete records are skipped. If several complete records carry the
/// name, the last one wins.
pub fn resolve_identity_provider(
    apps: &[ClientApp],
    app_name: &str,
) -> Result<IdentityProviderApp, SpotError> {
    let mut resolved = None;
    for app in apps {
        let (Some(name), Some(client_id), Some(domain)) = (&app.name, &app.client_id, &app.domain)
        else {
            continue;
        };
        if name == app_name {
            resolved = Some((client_id, domain));
        }
    }

    let (client_id, domain) =
        resolved.ok_or_else(|| SpotError::IdentityProviderNotFound(app_name.to_string()))?;
    if client_id.is_empty() || domain.is_empty() {
        return Err(SpotError::InvalidConfiguration(
            "identity provider client id or domain is empty".to_string(),
        ));
    }

    let issuer_url = Url::parse(&format!("https://{domain}/"))
        .map_err(|e| SpotError::InvalidUrl(e.to_string()))?;
    Ok(IdentityProviderApp {
        client_id: client_id.clone(),
        issuer_url,
    })
}
