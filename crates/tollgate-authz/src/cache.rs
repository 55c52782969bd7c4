//! The decision cache: one [`CachedSecurityService`] per (module, consumer).

use std::sync::Arc;
use std::time::Duration;

use tollgate_core::{ConsumerKey, ModuleConsumerStore, ModuleName, TollgateConfig};
use tracing::{debug, info};

use crate::backend::PermissionBackend;
use crate::error::{AuthzError, AuthzResult};
use crate::event::{ModuleEvent, ModuleEventListener};
use crate::service::CachedSecurityService;

/// Absolute lifetime of a cached service.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(15 * 60);

/// Longest a single decision may wait on the backend before it counts as
/// failed.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a decision is retried after its service was invalidated
/// mid-flight.
const INVALIDATION_RETRIES: usize = 3;

/// Cache of authorization decisions partitioned by module and consumer.
///
/// A service is created on first use and replaced once it is older than the
/// configured max age. Services are never refreshed in place.
#[derive(Debug)]
pub struct DecisionCache {
    backend: Arc<dyn PermissionBackend>,
    store: ModuleConsumerStore<CachedSecurityService>,
    max_age: Duration,
    backend_timeout: Duration,
}

impl DecisionCache {
    /// Create a cache with the default max age and backend timeout.
    #[must_use]
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        Self {
            backend,
            store: ModuleConsumerStore::new(),
            max_age: DEFAULT_MAX_AGE,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Create a cache using the limits from `config`.
    #[must_use]
    pub fn from_config(backend: Arc<dyn PermissionBackend>, config: &TollgateConfig) -> Self {
        Self::new(backend)
            .with_max_age(Duration::from_secs(config.decision_max_age_secs))
            .with_backend_timeout(Duration::from_millis(config.backend_timeout_ms))
    }

    /// Set the absolute lifetime of cached services.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the backend lookup timeout.
    #[must_use]
    pub fn with_backend_timeout(mut self, backend_timeout: Duration) -> Self {
        self.backend_timeout = backend_timeout;
        self
    }

    /// Absolute lifetime of cached services.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// The live service for `(module, consumer)`, creating a fresh one when
    /// none exists or the existing one has expired or been invalidated.
    #[must_use]
    pub fn service(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
    ) -> Arc<CachedSecurityService> {
        let max_age = self.max_age;
        self.store.get_or_create_with(
            module,
            consumer,
            |service| !service.is_expired(max_age) && !service.is_invalidated(),
            || {
                debug!(%module, %consumer, "Creating security service");
                CachedSecurityService::new(
                    module.clone(),
                    consumer.clone(),
                    Arc::clone(&self.backend),
                    self.backend_timeout,
                )
            },
        )
    }

    /// Answer one decision from the live service of `(module, consumer)`.
    ///
    /// When a module event invalidates the service while it answers, the
    /// decision is retried against a fresh service.
    pub fn decide<T>(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        decide: impl Fn(&CachedSecurityService) -> AuthzResult<T>,
    ) -> AuthzResult<T> {
        let mut attempt = 0;
        loop {
            let service = self.service(module, consumer);
            match decide(service.as_ref()) {
                Err(AuthzError::Invalidated { .. }) if attempt < INVALIDATION_RETRIES => {
                    attempt += 1;
                    debug!(%module, %consumer, attempt, "Retrying decision on a fresh service");
                }
                answer => return answer,
            }
        }
    }

    /// Invalidate and drop every cached service of `module`. Handles still
    /// held by callers stop answering. Returns the number dropped.
    pub fn invalidate_module(&self, module: &ModuleName) -> usize {
        let removed = self.store.retain(|m, _, service| {
            if m == module {
                service.invalidate();
                false
            } else {
                true
            }
        });
        info!(%module, removed, "Invalidated cached decisions");
        removed
    }

    /// Drop every service older than the max age. Returns the number dropped.
    pub fn evict_expired(&self) -> usize {
        let max_age = self.max_age;
        let removed = self.store.retain(|_, _, service| !service.is_expired(max_age));
        if removed > 0 {
            debug!(removed, "Evicted expired security services");
        }
        removed
    }

    /// Drop every cached service.
    pub fn clear(&self) {
        self.store.reset();
    }

    /// Number of cached services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no service is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl ModuleEventListener for DecisionCache {
    fn module_changed(&self, event: &ModuleEvent) {
        debug!(module = %event.module, action = %event.action, "Module event received");
        if event.invalidates_security() {
            self.invalidate_module(&event.module);
        }
    }
}
