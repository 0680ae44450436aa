//! Fakes shared by the session unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use storefront_domain::ExchangeError;
use tokio::sync::Semaphore;

use crate::ports::{
    Clock, ExchangeReply, ExchangeRequest, ExchangeTransport, IdentityError, IdentityProvider,
    StorageBackend, StorageError,
};

/// Builds an unsigned token whose claims carry `sub` and `exp`.
pub fn mint(subject: &str, expires_at: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(
        r#"{{"sub":"{subject}","exp":{}}}"#,
        expires_at.timestamp()
    ));
    format!("{header}.{claims}.c2lnbmF0dXJl")
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.timestamp_opt(1_750_000_000, 0).unwrap()),
        })
    }

    pub fn advance(&self, seconds: i64) {
        *self.now.lock() += Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// In-memory storage tier that can be told to fail writes.
#[derive(Debug, Default)]
pub struct MapTier {
    entries: Mutex<HashMap<String, String>>,
    reads: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MapTier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let tier = Self::default();
        tier.fail_writes.store(true, Ordering::SeqCst);
        Arc::new(tier)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl StorageBackend for MapTier {
    fn name(&self) -> &str {
        "map"
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        self.put(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Transport that replays scripted replies and counts calls.
///
/// When gated, each call waits for a permit before answering.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ExchangeReply, ExchangeError>>>,
    fallback: Mutex<Option<Result<ExchangeReply, ExchangeError>>>,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    last_request: Mutex<Option<ExchangeRequest>>,
}

impl ScriptedTransport {
    pub fn always(reply: Result<ExchangeReply, ExchangeError>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Some(reply)),
            calls: AtomicUsize::new(0),
            gate: None,
            last_request: Mutex::new(None),
        })
    }

    pub fn sequence(replies: Vec<Result<ExchangeReply, ExchangeError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: Mutex::new(None),
            calls: AtomicUsize::new(0),
            gate: None,
            last_request: Mutex::new(None),
        })
    }

    pub fn gated(reply: Result<ExchangeReply, ExchangeError>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Some(reply)),
            calls: AtomicUsize::new(0),
            gate: Some(Semaphore::new(0)),
            last_request: Mutex::new(None),
        })
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ExchangeRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl ExchangeTransport for ScriptedTransport {
    async fn post(&self, request: &ExchangeRequest) -> Result<ExchangeReply, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let next = self.replies.lock().pop_front();
        next.or_else(|| self.fallback.lock().clone())
            .expect("no scripted reply left")
    }
}

/// Successful exchange reply carrying `token`.
pub fn ok_reply(token: &str, expires_in: i64) -> Result<ExchangeReply, ExchangeError> {
    Ok(ExchangeReply::new(
        200,
        format!(r#"{{"access_token":"{token}","expires_in":{expires_in}}}"#),
    ))
}

/// Transport-level failure.
pub fn unreachable_reply() -> Result<ExchangeReply, ExchangeError> {
    Err(ExchangeError::Unavailable {
        message: "connection refused".to_string(),
    })
}

/// Identity provider returning a fixed answer and counting calls.
#[derive(Debug)]
pub struct FixedIdentity {
    answer: Result<String, IdentityError>,
    calls: AtomicUsize,
}

impl FixedIdentity {
    pub fn signed_in() -> Arc<Self> {
        Arc::new(Self {
            answer: Ok("identity-assertion".to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self {
            answer: Err(IdentityError::SignedOut),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn assertion(&self) -> Result<String, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}
