// src/provider.rs

use crate::config::{ProviderSettings, ReadinessSettings};
use crate::error::SpotError;
use crate::exchange::{
    resolve_identity_provider, ClientAppDirectory, IdentityProviderApp, OidcDiscovery,
    TokenExchanger,
};
use crate::jwks::JwksResolver;
use crate::readiness::ReadinessPoller;
use crate::resource::{NamespacedName, ResourceApi};
use crate::token::SpotToken;
use std::fmt;
use tracing::{debug, info, instrument};
use url::Url;

/// Maps an organization id to the namespace holding its resources.
///
/// `org_AbC_1` becomes `org-abc-1`.
pub fn namespace_for_org(org_id: &str) -> String {
    org_id.to_lowercase().replace('_', "-")
}

/// Runs the fail-closed checks on a freshly exchanged identity token.
///
/// The order is parse, expiry, verified email, signature. The org id is read
/// by the caller once all of them passed.
#[instrument(skip(raw, resolver), err)]
pub async fn validate_identity_token(
    raw: String,
    resolver: &JwksResolver,
) -> Result<SpotToken, SpotError> {
    let token = SpotToken::parse(raw)?;
    if token.is_expired() {
        return Err(SpotError::TokenExpired);
    }
    if !token.is_email_verified() {
        return Err(SpotError::EmailNotVerified);
    }
    token.verify_signature(resolver).await?;
    Ok(token)
}

/// The identity established by provider configuration.
///
/// Every resource and data source receives this value instead of reading
/// process-wide state.
#[derive(Clone)]
pub struct ProviderSession {
    pub api_server: Url,
    pub org_id: String,
    pub namespace: String,
    pub readiness: ReadinessSettings,
    id_token: String,
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("api_server", &self.api_server)
            .field("org_id", &self.org_id)
            .field("namespace", &self.namespace)
            .field("readiness", &self.readiness)
            .field("id_token", &"[REDACTED]")
            .finish()
    }
}

impl ProviderSession {
    pub fn new(
        api_server: Url,
        org_id: impl Into<String>,
        id_token: impl Into<String>,
        readiness: ReadinessSettings,
    ) -> Self {
        let org_id = org_id.into();
        Self {
            api_server,
            namespace: namespace_for_org(&org_id),
            org_id,
            readiness,
            id_token: id_token.into(),
        }
    }

    /// The bearer token for resource API calls.
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    /// Key for a resource of this organization.
    pub fn key(&self, name: &str) -> NamespacedName {
        NamespacedName::new(&self.namespace, name)
    }

    /// Key for a stored resource id, falling back to this organization's namespace.
    pub fn key_from_id(&self, id: &str) -> NamespacedName {
        NamespacedName::from_id(id, &self.namespace)
    }

    /// A poller using the session's readiness timing.
    pub fn readiness_poller<'a>(
        &self,
        api: &'a dyn ResourceApi,
    ) -> Result<ReadinessPoller<'a>, SpotError> {
        ReadinessPoller::new(api, self.readiness)
    }
}

/// Turns [`ProviderSettings`] into a [`ProviderSession`].
pub struct ProviderConfigurator<'a> {
    settings: &'a ProviderSettings,
    directory: &'a dyn ClientAppDirectory,
    http_client: reqwest::Client,
}

impl<'a> ProviderConfigurator<'a> {
    pub fn new(settings: &'a ProviderSettings, directory: &'a dyn ClientAppDirectory) -> Self {
        Self {
            settings,
            directory,
            http_client: reqwest::Client::new(),
        }
    }

    /// Shares an existing HTTP client for discovery, exchange and JWKS calls.
    pub fn with_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Exchanges the refresh token and validates the resulting identity token.
    ///
    /// Any failure aborts configuration; nothing is retried.
    #[instrument(skip(self), fields(api_server = %self.settings.api_server), err)]
    pub async fn configure(&self) -> Result<ProviderSession, SpotError> {
        let identity = self.identity_provider().await?;
        debug!(
            client_id = %identity.client_id,
            issuer = %identity.issuer_url,
            "Resolved identity provider"
        );

        let oauth_config = OidcDiscovery::with_client(self.http_client.clone())
            .client_config(&identity.issuer_url, &identity.client_id)
            .await?;

        let refresh_token = self.settings.token_source.resolve()?;
        let id_token = TokenExchanger::with_client(self.http_client.clone(), oauth_config)
            .exchange(&refresh_token)
            .await?;

        let resolver = JwksResolver::with_client(self.http_client.clone());
        let token = validate_identity_token(id_token, &resolver).await?;
        let org_id = token.org_id()?.to_string();

        let session = ProviderSession::new(
            self.settings.api_server.clone(),
            org_id,
            token.into_raw(),
            self.settings.readiness,
        );
        info!(
            org_id = %session.org_id,
            namespace = %session.namespace,
            "Token verified successfully"
        );
        Ok(session)
    }

    async fn identity_provider(&self) -> Result<IdentityProviderApp, SpotError> {
        if let (Some(issuer_url), Some(client_id)) =
            (&self.settings.issuer_url, &self.settings.client_id)
        {
            return Ok(IdentityProviderApp {
                client_id: client_id.clone(),
                issuer_url: issuer_url.clone(),
            });
        }

        let apps = self.directory.client_apps().await?;
        debug!("Directory returned {} client applications", apps.len());
        resolve_identity_provider(&apps, &self.settings.client_app_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettingsBuilder;
    use crate::exchange::ClientApp;
    use async_trait::async_trait;

    struct UnreachableDirectory;

    #[async_trait]
    impl ClientAppDirectory for UnreachableDirectory {
        async fn client_apps(&self) -> Result<Vec<ClientApp>, SpotError> {
            Err(SpotError::Directory("organizer API unavailable".to_string()))
        }
    }

    #[test]
    fn namespace_is_lowercase_with_dashes() {
        assert_eq!(namespace_for_org("org_AbC_1"), "org-abc-1");
        assert_eq!(namespace_for_org("plain"), "plain");
    }

    #[test]
    fn session_derives_keys_in_its_namespace() {
        let session = ProviderSession::new(
            Url::parse("https://spot.rackspace.com").unwrap(),
            "org_XYZ",
            "id-token",
            ReadinessSettings::default(),
        );
        assert_eq!(session.namespace, "org-xyz");
        assert_eq!(session.key("cs"), NamespacedName::new("org-xyz", "cs"));
        assert_eq!(
            session.key_from_id("other-ns/cs"),
            NamespacedName::new("other-ns", "cs")
        );
        assert_eq!(session.key_from_id("cs"), NamespacedName::new("org-xyz", "cs"));
        assert!(!format!("{session:?}").contains("id-token"));
    }

    #[tokio::test]
    async fn directory_failure_aborts_configuration() {
        let settings = ProviderSettingsBuilder::new()
            .token("refresh-token")
            .build()
            .unwrap();
        let result = ProviderConfigurator::new(&settings, &UnreachableDirectory)
            .configure()
            .await;
        assert!(matches!(result, Err(SpotError::Directory(ref m)) if m.contains("unavailable")));
    }
}
