//! Shopper Identity

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a signed-in shopper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Wrap an authentication-provider user id.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Current authentication state of the visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Identity {
    /// Nobody is signed in.
    #[default]
    Anonymous,

    /// A shopper is signed in.
    SignedIn(UserId),
}

impl Identity {
    /// The signed-in user, if any.
    #[must_use]
    pub fn user(self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::SignedIn(user) => Some(user),
        }
    }
}

/// Accessor for the current identity, injected into the cart store and payment handshake.
#[automock]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity at the time of the call.
    async fn current(&self) -> Identity;
}

/// Identity held in memory and swapped by the authentication layer on sign-in/sign-out.
#[derive(Debug, Clone, Default)]
pub struct SharedIdentity {
    inner: Arc<RwLock<Identity>>,
}

impl SharedIdentity {
    /// Start with `identity`.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            inner: Arc::new(RwLock::new(identity)),
        }
    }

    /// Replace the current identity.
    pub fn set(&self, identity: Identity) {
        match self.inner.write() {
            Ok(mut guard) => *guard = identity,
            Err(poisoned) => *poisoned.into_inner() = identity,
        }
    }

    fn get(&self) -> Identity {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SharedIdentity {
    async fn current(&self) -> Identity {
        self.get()
    }
}
