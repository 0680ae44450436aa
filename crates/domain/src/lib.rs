//! Storefront Domain - Core session types
//!
//! This crate defines the value objects of the session token lifecycle:
//! tokens, their structural validation, session events and settings.
//! All types here are pure Rust with no I/O dependencies.

pub mod error;
pub mod event;
pub mod session;
pub mod settings;
pub mod token;
pub mod validator;

pub use error::{ClaimsError, ClaimsResult, ExchangeError};
pub use event::{ClearReason, SessionEvent};
pub use session::SessionStatus;
pub use settings::{DEFAULT_NAMESPACE, SessionSettings};
pub use token::{Token, TokenSource, expiry_after};
pub use validator::{TokenClaims, decode_claims, is_structurally_valid, is_structurally_valid_at};
