//! Session context: the composition root.
//!
//! Built once at startup and passed by reference to every UI region that
//! needs a session token or session events.

use std::sync::Arc;

use storefront_application::ports::{Clock, ExchangeTransport, IdentityProvider, StorageBackend};
use storefront_application::{
    EventBus, ExchangeClient, SessionCoordinator, SessionListener, SessionResult, TokenCache,
};
use storefront_domain::{SessionStatus, Token};
use storefront_infrastructure::{
    FileStorage, MemoryStorage, ReqwestExchangeTransport, SystemClock, TransportSetupError,
};
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigError};

/// Errors raised while building a [`SessionContext`].
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The configuration is incomplete or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP transport could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportSetupError),
}

/// Shared session state for one storefront.
#[derive(Debug)]
pub struct SessionContext {
    config: AppConfig,
    cache: Arc<TokenCache>,
    bus: EventBus,
    coordinator: Arc<SessionCoordinator>,
}

/// Builder for [`SessionContext`]; every port has a production default.
pub struct SessionContextBuilder {
    config: AppConfig,
    identity: Arc<dyn IdentityProvider>,
    transport: Option<Arc<dyn ExchangeTransport>>,
    clock: Option<Arc<dyn Clock>>,
    tiers: Option<Vec<Arc<dyn StorageBackend>>>,
}

impl SessionContext {
    /// Starts building a context from `config`, taking identity assertions
    /// from `identity`.
    #[must_use]
    pub fn builder(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> SessionContextBuilder {
        SessionContextBuilder {
            config,
            identity,
            transport: None,
            clock: None,
            tiers: None,
        }
    }

    /// Returns a valid session token. See [`SessionCoordinator::ensure_token`].
    ///
    /// # Errors
    ///
    /// Returns the coordinator's error when no token can be obtained.
    pub async fn ensure_token(&self) -> SessionResult<Token> {
        self.coordinator.ensure_token().await
    }

    /// Ends the session.
    pub fn logout(&self) {
        self.coordinator.logout();
    }

    /// Enables background renewal.
    pub fn start(&self) {
        self.coordinator.start();
    }

    /// Current session snapshot.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.coordinator.status()
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> SessionListener {
        self.bus.subscribe()
    }

    /// The coordinator, for callers that need the full API.
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// The token cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// The configuration this context was built from.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl SessionContextBuilder {
    /// Uses `transport` instead of the reqwest transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn ExchangeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses `clock` instead of the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Appends a storage tier. Once any tier is given, the default tiers
    /// are not created.
    #[must_use]
    pub fn tier(mut self, tier: Arc<dyn StorageBackend>) -> Self {
        self.tiers.get_or_insert_with(Vec::new).push(tier);
        self
    }

    /// Wires the context.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, or if the default
    /// transport is needed and no backend URL is configured.
    pub fn build(self) -> Result<SessionContext, ContextError> {
        let Self {
            config,
            identity,
            transport,
            clock,
            tiers,
        } = self;
        config.validate()?;
        let settings = config.session.clone();

        let transport: Arc<dyn ExchangeTransport> = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestExchangeTransport::new(
                config.backend_url()?,
                config.request_timeout(),
            )?),
        };
        let clock = clock.unwrap_or_else(SystemClock::shared);
        let tiers = tiers.unwrap_or_else(|| default_tiers(&config));

        let cache = TokenCache::new(settings.namespace.clone(), Arc::clone(&clock));
        let cache = Arc::new(tiers.into_iter().fold(cache, TokenCache::with_tier));
        let bus = EventBus::new(settings.event_capacity);
        let exchange = Arc::new(
            ExchangeClient::new(transport, Arc::clone(&cache), bus.clone(), Arc::clone(&clock))
                .with_default_ttl(settings.default_ttl_secs)
                .with_remember_me(settings.remember_me),
        );
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::clone(&cache),
            exchange,
            identity,
            bus.clone(),
            clock,
            settings,
        ));

        info!(namespace = %config.session.namespace, "session context ready");
        Ok(SessionContext {
            config,
            cache,
            bus,
            coordinator,
        })
    }
}

impl std::fmt::Debug for SessionContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContextBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_clock", &self.clock.is_some())
            .finish_non_exhaustive()
    }
}

/// A process-local tier, then the session file when durable storage is on.
fn default_tiers(config: &AppConfig) -> Vec<Arc<dyn StorageBackend>> {
    let mut tiers: Vec<Arc<dyn StorageBackend>> = vec![Arc::new(MemoryStorage::new())];
    if !config.durable_storage {
        return tiers;
    }
    match config.storage_dir.clone().or_else(FileStorage::default_dir) {
        Some(dir) => {
            let file = FileStorage::in_dir(&dir, &config.session.namespace);
            info!(path = %file.path().display(), "persisting session token");
            tiers.push(Arc::new(file));
        }
        None => warn!("no data directory available; session token will not survive restarts"),
    }
    tiers
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use storefront_infrastructure::StaticIdentityProvider;
    use tempfile::TempDir;
    use url::Url;

    fn config(dir: &TempDir) -> AppConfig {
        AppConfig {
            backend_url: Some(Url::parse("http://127.0.0.1:9/").unwrap()),
            storage_dir: Some(dir.path().to_path_buf()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_build_requires_backend_url_for_default_transport() {
        let result = SessionContext::builder(
            AppConfig::default(),
            Arc::new(StaticIdentityProvider::new()),
        )
        .build();
        assert!(matches!(
            result,
            Err(ContextError::Config(ConfigError::MissingBackendUrl))
        ));
    }

    #[test]
    fn test_default_tiers_follow_durable_storage() {
        let dir = TempDir::new().unwrap();
        let durable = default_tiers(&config(&dir));
        assert_eq!(
            durable.iter().map(|tier| tier.name()).collect::<Vec<_>>(),
            vec!["memory", "file"]
        );

        let volatile = default_tiers(&AppConfig {
            durable_storage: false,
            ..config(&dir)
        });
        assert_eq!(volatile.len(), 1);
    }

    #[tokio::test]
    async fn test_built_context_starts_absent() {
        let dir = TempDir::new().unwrap();
        let context = SessionContext::builder(config(&dir), Arc::new(StaticIdentityProvider::new()))
            .build()
            .unwrap();
        assert_eq!(context.status(), SessionStatus::Absent);
        assert_eq!(context.cache().token_key(), "storefront_token");
    }
}
