//! Identity backend and user cache.
//!
//! The [`IdentityBackend`] trait resolves Digest users and OAuth consumers
//! from an external store. A [`UserCache`] sits in front of user lookups;
//! verifiers reload a cached user from the backend once when the cached
//! password produces a mismatch.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::IdentityError;

/// A Digest user as stored by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Login name.
    pub username: String,
    /// Plain password, or `md5(username:realm:password)` when the gateway is
    /// configured with pre-encoded passwords.
    pub password: String,
    /// Whether the account may authenticate.
    pub active: bool,
    /// Groups granted to the user, reported as authorities.
    pub groups: Vec<String>,
}

impl UserRecord {
    /// Create an active user with no groups.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            active: true,
            groups: Vec::new(),
        }
    }

    /// Replace the user's groups.
    #[must_use]
    pub fn with_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the account inactive.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.active = false;
        self
    }
}

/// An OAuth consumer as stored by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRecord {
    /// Public consumer key.
    pub consumer_key: String,
    /// Shared secret.
    pub secret: String,
    /// Authorities granted to the consumer.
    pub authorities: Vec<String>,
}

/// Trait for resolving users and consumers.
///
/// Implementations may back this with a database, a directory service, or
/// any other identity store.
pub trait IdentityBackend: Send + Sync + fmt::Debug {
    /// Load a Digest user by name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NotFound`] if the user does not exist.
    fn load_user(&self, username: &str) -> Result<UserRecord, IdentityError>;

    /// Look up an OAuth consumer by key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NotFound`] if the consumer does not exist.
    fn lookup_consumer(&self, consumer_key: &str) -> Result<ConsumerRecord, IdentityError>;
}

/// An in-memory identity backend.
///
/// # Examples
///
/// ```
/// use tollgate_auth::{IdentityBackend, StaticIdentityBackend};
///
/// let backend = StaticIdentityBackend::new().with_account("c1", "p1", ["USER"]);
///
/// assert_eq!(backend.load_user("c1").unwrap().password, "p1");
/// assert_eq!(backend.lookup_consumer("c1").unwrap().secret, "p1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityBackend {
    users: HashMap<String, UserRecord>,
    consumers: HashMap<String, ConsumerRecord>,
}

impl StaticIdentityBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Digest user.
    #[must_use]
    pub fn with_user(mut self, user: UserRecord) -> Self {
        self.users.insert(user.username.clone(), user);
        self
    }

    /// Register an OAuth consumer.
    #[must_use]
    pub fn with_consumer(mut self, consumer: ConsumerRecord) -> Self {
        self.consumers.insert(consumer.consumer_key.clone(), consumer);
        self
    }

    /// Register an account usable with both schemes: the consumer key is
    /// the Digest username and the consumer secret is the Digest password.
    #[must_use]
    pub fn with_account<S: Into<String>>(
        self,
        consumer_key: &str,
        secret: &str,
        groups: impl IntoIterator<Item = S>,
    ) -> Self {
        let user = UserRecord::new(consumer_key, secret).with_groups(groups);
        let consumer = ConsumerRecord {
            consumer_key: consumer_key.to_owned(),
            secret: secret.to_owned(),
            authorities: user.groups.clone(),
        };
        self.with_user(user).with_consumer(consumer)
    }
}

impl IdentityBackend for StaticIdentityBackend {
    fn load_user(&self, username: &str) -> Result<UserRecord, IdentityError> {
        self.users
            .get(username)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(username.to_owned()))
    }

    fn lookup_consumer(&self, consumer_key: &str) -> Result<ConsumerRecord, IdentityError> {
        self.consumers
            .get(consumer_key)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(consumer_key.to_owned()))
    }
}

/// A cache of user records in front of [`IdentityBackend::load_user`].
pub trait UserCache: Send + Sync + fmt::Debug {
    /// Return the cached user, if any.
    fn get(&self, username: &str) -> Option<UserRecord>;

    /// Store a user freshly loaded from the backend.
    fn put(&self, user: UserRecord);

    /// Drop a cached user.
    fn remove(&self, username: &str);
}

/// A cache that never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUserCache;

impl UserCache for NullUserCache {
    fn get(&self, _username: &str) -> Option<UserRecord> {
        None
    }

    fn put(&self, _user: UserRecord) {}

    fn remove(&self, _username: &str) {}
}

/// A concurrent user cache whose entries expire after a fixed time to live.
#[derive(Debug)]
pub struct InMemoryUserCache {
    ttl: Duration,
    entries: DashMap<String, (UserRecord, Instant)>,
}

impl InMemoryUserCache {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Number of cached users, including any not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl UserCache for InMemoryUserCache {
    fn get(&self, username: &str) -> Option<UserRecord> {
        if let Some(entry) = self.entries.get(username) {
            let (user, stored_at) = entry.value();
            if stored_at.elapsed() < self.ttl {
                return Some(user.clone());
            }
        }
        self.entries
            .remove_if(username, |_, (_, stored_at)| stored_at.elapsed() >= self.ttl);
        None
    }

    fn put(&self, user: UserRecord) {
        self.entries
            .insert(user.username.clone(), (user, Instant::now()));
    }

    fn remove(&self, username: &str) {
        self.entries.remove(username);
    }
}
