// src/lib.rs

pub mod config;
pub mod error;
pub mod exchange;
pub mod jwks;
pub mod logging;
pub mod model;
pub mod provider;
pub mod readiness;
pub mod resource;
pub mod testing;
pub mod token;

/// The public prelude for the `spot-provider-core` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{ProviderSettings, ProviderSettingsBuilder, ReadinessSettings, TokenSource};
    pub use crate::error::SpotError;
    pub use crate::exchange::{ClientApp, ClientAppDirectory, OidcDiscovery, TokenExchanger};
    pub use crate::jwks::JwksResolver;
    pub use crate::provider::{ProviderConfigurator, ProviderSession};
    pub use crate::readiness::{ReadinessError, ReadinessPoller};
    pub use crate::resource::{ApiError, NamespacedName, RemoteResource, ResourceApi, ResourceStatus};
    pub use crate::token::SpotToken;
    pub use jsonwebtoken::Algorithm;
    pub use tokio_util::sync::CancellationToken;
}
