// src/config.rs

use crate::error::SpotError;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// The resource API used when `NGPC_APISERVER` is not set.
pub const DEFAULT_API_SERVER: &str = "https://spot.rackspace.com";

/// Display name of the identity-provider application in the organizer directory.
pub const DEFAULT_CLIENT_APP_NAME: &str = "terraform-provider-spot";

/// Token files larger than this are truncated when read.
pub const TOKEN_FILE_MAX_BYTES: u64 = 5120;

pub const ENV_API_SERVER: &str = "NGPC_APISERVER";
pub const ENV_TOKEN: &str = "RXTSPOT_TOKEN";
pub const ENV_TOKEN_FILE: &str = "RXTSPOT_TOKEN_FILE";

/// Timing of a readiness wait.
///
/// A wait makes at most `ceil(timeout / interval) + 1` attempts. An `Error`
/// phase seen during the first `grace_period` is not counted; afterwards
/// `error_threshold` consecutive `Error` observations end the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub grace_period: Duration,
    pub error_threshold: u32,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5 * 60),
            grace_period: Duration::from_secs(2 * 60),
            error_threshold: 3,
        }
    }
}

impl ReadinessSettings {
    /// Returns a copy with a caller-supplied timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The attempt budget: `ceil(timeout / interval) + 1`.
    pub fn max_attempts(&self) -> u64 {
        let interval = self.interval.as_nanos().max(1);
        let intervals = self.timeout.as_nanos().div_ceil(interval);
        u64::try_from(intervals).unwrap_or(u64::MAX - 1) + 1
    }

    pub fn validate(&self) -> Result<(), SpotError> {
        if self.interval.is_zero() {
            return Err(SpotError::InvalidConfiguration(
                "readiness poll interval must be greater than zero".to_string(),
            ));
        }
        if self.error_threshold == 0 {
            return Err(SpotError::InvalidConfiguration(
                "readiness error threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the long-lived refresh token comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// The token itself, from provider configuration or `RXTSPOT_TOKEN`.
    Literal(String),
    /// A file holding the token, from `RXTSPOT_TOKEN_FILE`.
    File(PathBuf),
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Literal(_) => f.write_str("Literal([REDACTED])"),
            TokenSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

impl TokenSource {
    /// Produces the refresh token.
    ///
    /// Files are read up to [`TOKEN_FILE_MAX_BYTES`]; NUL bytes and surrounding
    /// whitespace are stripped.
    pub fn resolve(&self) -> Result<String, SpotError> {
        match self {
            TokenSource::Literal(token) => Ok(token.clone()),
            TokenSource::File(path) => {
                let to_error = |source| SpotError::TokenFile {
                    path: path.display().to_string(),
                    source,
                };
                let file = std::fs::File::open(path).map_err(to_error)?;
                let mut buf = Vec::new();
                file.take(TOKEN_FILE_MAX_BYTES)
                    .read_to_end(&mut buf)
                    .map_err(to_error)?;
                let text = String::from_utf8_lossy(&buf);
                Ok(text.trim_matches('\0').trim().to_string())
            }
        }
    }
}

/// Everything the provider configuration flow needs.
///
/// Construct it with [`ProviderSettingsBuilder`].
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// The resource API base URL.
    pub api_server: Url,
    /// Source of the refresh token.
    pub token_source: TokenSource,
    /// Name of the identity-provider application in the organizer directory.
    pub client_app_name: String,
    /// Explicit issuer, bypassing the directory lookup when set with `client_id`.
    pub issuer_url: Option<Url>,
    /// Explicit OAuth client ID, bypassing the directory lookup when set with `issuer_url`.
    pub client_id: Option<String>,
    /// Default timing for readiness waits.
    pub readiness: ReadinessSettings,
}

/// A builder for creating a `ProviderSettings` instance.
#[derive(Default)]
pub struct ProviderSettingsBuilder {
    api_server: Option<Url>,
    token: Option<String>,
    env_token: Option<String>,
    env_token_file: Option<PathBuf>,
    client_app_name: Option<String>,
    issuer_url: Option<Url>,
    client_id: Option<String>,
    readiness: ReadinessSettings,
}

impl ProviderSettingsBuilder {
    /// Creates a new `ProviderSettingsBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder from the process environment.
    pub fn from_env() -> Result<Self, SpotError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Seeds the builder from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SpotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let mut builder = Self::new();
        if let Some(api_server) = get(ENV_API_SERVER) {
            builder = builder.api_server(&api_server)?;
        }
        builder.env_token = get(ENV_TOKEN);
        builder.env_token_file = get(ENV_TOKEN_FILE).map(PathBuf::from);
        Ok(builder)
    }

    /// Sets the resource API base URL.
    pub fn api_server(mut self, url: &str) -> Result<Self, SpotError> {
        let parsed_url = Url::parse(url).map_err(|e| SpotError::InvalidUrl(e.to_string()))?;
        self.api_server = Some(parsed_url);
        Ok(self)
    }

    /// Sets the refresh token given in provider configuration. It takes
    /// precedence over the environment.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the path of a file holding the refresh token.
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_token_file = Some(path.into());
        self
    }

    /// Sets the identity-provider application name to look up.
    pub fn client_app_name(mut self, name: impl Into<String>) -> Self {
        self.client_app_name = Some(name.into());
        self
    }

    /// Sets the issuer URL explicitly.
    pub fn issuer_url(mut self, url: &str) -> Result<Self, SpotError> {
        let parsed_url = Url::parse(url).map_err(|e| SpotError::InvalidUrl(e.to_string()))?;
        self.issuer_url = Some(parsed_url);
        Ok(self)
    }

    /// Sets the OAuth client ID explicitly.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the readiness timing.
    pub fn readiness(mut self, readiness: ReadinessSettings) -> Self {
        self.readiness = readiness;
        self
    }

    /// Consumes the builder and returns a `ProviderSettings` object.
    ///
    /// # Errors
    ///
    /// Returns [`SpotError::MissingToken`] if neither a token nor a token file
    /// was provided, and [`SpotError::MissingConfiguration`] if only one of
    /// `issuer_url` and `client_id` was set.
    pub fn build(self) -> Result<ProviderSettings, SpotError> {
        let token_source = match (self.token, self.env_token, self.env_token_file) {
            (Some(token), _, _) if !token.is_empty() => TokenSource::Literal(token),
            (_, Some(token), _) => TokenSource::Literal(token),
            (_, _, Some(path)) => TokenSource::File(path),
            _ => return Err(SpotError::MissingToken),
        };

        match (&self.issuer_url, &self.client_id) {
            (Some(_), None) => {
                return Err(SpotError::MissingConfiguration("client_id".to_string()))
            }
            (None, Some(_)) => {
                return Err(SpotError::MissingConfiguration("issuer_url".to_string()))
            }
            _ => {}
        }

        self.readiness.validate()?;

        let api_server = match self.api_server {
            Some(url) => url,
            None => Url::parse(DEFAULT_API_SERVER).map_err(|e| SpotError::InvalidUrl(e.to_string()))?,
        };

        Ok(ProviderSettings {
            api_server,
            token_source,
            client_app_name: self
                .client_app_name
                .unwrap_or_else(|| DEFAULT_CLIENT_APP_NAME.to_string()),
            issuer_url: self.issuer_url,
            client_id: self.client_id,
            readiness: self.readiness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn max_attempts_rounds_up_and_adds_one() {
        let settings = ReadinessSettings::default();
        assert_eq!(settings.max_attempts(), 61);

        let settings = ReadinessSettings {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(12),
            ..ReadinessSettings::default()
        };
        assert_eq!(settings.max_attempts(), 4);

        let settings = settings.with_timeout(Duration::ZERO);
        assert_eq!(settings.max_attempts(), 1);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let readiness = ReadinessSettings {
            interval: Duration::ZERO,
            ..ReadinessSettings::default()
        };
        let result = ProviderSettingsBuilder::new()
            .token("rt")
            .readiness(readiness)
            .build();
        assert!(matches!(result, Err(SpotError::InvalidConfiguration(_))));
    }

    #[test]
    fn literal_token_wins_over_environment() {
        let settings = ProviderSettingsBuilder::from_lookup(lookup(&[
            (ENV_TOKEN, "env-token"),
            (ENV_TOKEN_FILE, "/tmp/ignored"),
        ]))
        .unwrap()
        .token("configured")
        .build()
        .unwrap();
        assert_eq!(
            settings.token_source,
            TokenSource::Literal("configured".to_string())
        );
    }

    #[test]
    fn env_token_wins_over_token_file() {
        let settings = ProviderSettingsBuilder::from_lookup(lookup(&[
            (ENV_TOKEN, "env-token"),
            (ENV_TOKEN_FILE, "/tmp/ignored"),
        ]))
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(
            settings.token_source,
            TokenSource::Literal("env-token".to_string())
        );
    }

    #[test]
    fn token_file_is_used_when_no_token_is_set() {
        let settings =
            ProviderSettingsBuilder::from_lookup(lookup(&[(ENV_TOKEN_FILE, "/tmp/token")]))
                .unwrap()
                .build()
                .unwrap();
        assert_eq!(
            settings.token_source,
            TokenSource::File(PathBuf::from("/tmp/token"))
        );
    }

    #[test]
    fn missing_token_is_an_error() {
        let result = ProviderSettingsBuilder::from_lookup(lookup(&[(ENV_TOKEN, "")]))
            .unwrap()
            .build();
        assert!(matches!(result, Err(SpotError::MissingToken)));
    }

    #[test]
    fn api_server_defaults_and_overrides() {
        let settings = ProviderSettingsBuilder::new().token("rt").build().unwrap();
        assert_eq!(settings.api_server.as_str(), "https://spot.rackspace.com/");
        assert_eq!(settings.client_app_name, DEFAULT_CLIENT_APP_NAME);

        let settings = ProviderSettingsBuilder::from_lookup(lookup(&[(
            ENV_API_SERVER,
            "https://spot.example.test",
        )]))
        .unwrap()
        .token("rt")
        .build()
        .unwrap();
        assert_eq!(settings.api_server.as_str(), "https://spot.example.test/");

        assert!(matches!(
            ProviderSettingsBuilder::new().api_server("not a url"),
            Err(SpotError::InvalidUrl(_))
        ));
    }

    #[test]
    fn issuer_and_client_id_come_in_pairs() {
        let result = ProviderSettingsBuilder::new()
            .token("rt")
            .issuer_url("https://issuer.test/")
            .unwrap()
            .build();
        assert!(matches!(result, Err(SpotError::MissingConfiguration(ref f)) if f == "client_id"));

        let result = ProviderSettingsBuilder::new()
            .token("rt")
            .client_id("cid")
            .build();
        assert!(matches!(result, Err(SpotError::MissingConfiguration(ref f)) if f == "issuer_url"));
    }

    #[test]
    fn token_file_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"  refresh-token-value\n\0\0").unwrap();
        let source = TokenSource::File(file.path().to_path_buf());
        assert_eq!(source.resolve().unwrap(), "refresh-token-value");
    }

    #[test]
    fn token_file_is_read_up_to_the_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b'a'; 6000]).unwrap();
        let source = TokenSource::File(file.path().to_path_buf());
        assert_eq!(source.resolve().unwrap().len(), TOKEN_FILE_MAX_BYTES as usize);
    }

    #[test]
    fn unreadable_token_file_is_reported() {
        let source = TokenSource::File(PathBuf::from("/definitely/not/here/token"));
        assert!(matches!(source.resolve(), Err(SpotError::TokenFile { .. })));
    }

    #[test]
    fn literal_token_is_redacted_in_debug() {
        let rendered = format!("{:?}", TokenSource::Literal("secret".to_string()));
        assert!(!rendered.contains("secret"));
    }
}
