//! Storefront - session token lifecycle for storefront UI regions
//!
//! Wires the domain, application and infrastructure crates into a
//! [`SessionContext`]:
//! - [`AppConfig`] loading from defaults, an optional file and the environment
//! - Tracing initialization
//! - The context builder, with production adapters as defaults
//!
//! ```no_run
//! use std::sync::Arc;
//! use storefront::{AppConfig, SessionContext, StaticIdentityProvider};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! storefront::init_tracing(&config.log_filter);
//!
//! let identity = Arc::new(StaticIdentityProvider::new());
//! let context = SessionContext::builder(config, identity.clone()).build()?;
//! context.start();
//!
//! identity.set_assertion("assertion-from-sign-in-widget");
//! let token = context.ensure_token().await?;
//! println!("{}", token.authorization_header());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, ENV_PREFIX};
pub use context::{ContextError, SessionContext, SessionContextBuilder};
pub use telemetry::init_tracing;

pub use storefront_application::{SessionError, SessionListener, SessionResult};
pub use storefront_domain::{
    ClearReason, ExchangeError, SessionEvent, SessionSettings, SessionStatus, Token, TokenSource,
};
pub use storefront_infrastructure::{FileStorage, MemoryStorage, StaticIdentityProvider};
