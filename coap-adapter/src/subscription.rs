//! Observe subscriptions
//!
//! A subscription is addressed by `<publisher>-<hex(token)>`: the identity
//! that authorized it plus the CoAP token of the observe exchange. The
//! registry only tracks who is subscribed to what; delivering notifications
//! is up to the protocol handler.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

// ============================================================================
// Subscription ID
// ============================================================================

/// Build the subscription ID for a publisher and a CoAP token
pub fn subscription_id(publisher: &str, token: &[u8]) -> String {
    format!("{}-{}", publisher, hex::encode(token))
}

// ============================================================================
// Service Trait
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// No subscription with this ID
    NotFound(String),
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::NotFound(id) => write!(f, "subscription '{}' not found", id),
        }
    }
}

impl std::error::Error for SubscriptionError {}

/// Teardown side of the protocol handler
pub trait SubscriptionService: Send + Sync {
    fn unsubscribe(&self, id: &str) -> Result<(), SubscriptionError>;
}

// ============================================================================
// Registry
// ============================================================================

/// An active observe relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Where notifications go
    pub observer: SocketAddr,
    /// Resource being observed
    pub resource_id: String,
}

/// In-memory subscription registry
pub struct Registry {
    subs: Mutex<HashMap<String, Subscription>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            subs: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or refresh) a subscription
    pub fn subscribe(&self, id: String, observer: SocketAddr, resource_id: String) {
        log::info!(
            "Subscribed '{}' to resource '{}' (observer={})",
            id,
            resource_id,
            observer
        );
        self.lock().insert(
            id,
            Subscription {
                observer,
                resource_id,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.lock().get(id).cloned()
    }

    /// Number of active subscriptions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Subscription>> {
        self.subs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionService for Registry {
    fn unsubscribe(&self, id: &str) -> Result<(), SubscriptionError> {
        match self.lock().remove(id) {
            Some(sub) => {
                log::info!(
                    "Unsubscribed '{}' from resource '{}'",
                    id,
                    sub.resource_id
                );
                Ok(())
            }
            None => Err(SubscriptionError::NotFound(id.to_string())),
        }
    }
}
