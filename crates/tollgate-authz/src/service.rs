//! Cached authorization decisions for one (module, consumer) pair.
//!
//! Each decision is memoized per key (action name, group name, resource
//! permission). Concurrent misses on one key reach the backend once; misses
//! on different keys resolve independently. Every public decision runs under
//! one deadline derived from the backend timeout, and nested lookups share
//! it. Slots are always taken in the order actions, resources, groups, rules.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tollgate_core::{ConsumerKey, ModuleName};
use tracing::{debug, warn};

use crate::backend::{ConsumerIdentity, Lookup, PermissionBackend, UserAttributes};
use crate::error::{AuthzError, AuthzResult, BackendError};
use crate::memo::Memo;
use crate::permission::{GroupPermissions, ResourcePermission};

/// Memoized decisions of one consumer within one module.
#[derive(Debug)]
pub struct CachedSecurityService {
    module: ModuleName,
    consumer: ConsumerKey,
    backend: Arc<dyn PermissionBackend>,
    backend_timeout: Duration,
    created_at: Instant,
    invalidated: AtomicBool,
    actions: Memo<String, bool>,
    resources: Memo<ResourcePermission, bool>,
    groups: Memo<String, bool>,
    rules: Memo<(), Arc<GroupPermissions>>,
    attributes: Memo<(), Arc<UserAttributes>>,
    identity: Memo<(), Option<ConsumerIdentity>>,
}

impl CachedSecurityService {
    /// Create an empty service.
    #[must_use]
    pub fn new(
        module: ModuleName,
        consumer: ConsumerKey,
        backend: Arc<dyn PermissionBackend>,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            module,
            consumer,
            backend,
            backend_timeout,
            created_at: Instant::now(),
            invalidated: AtomicBool::new(false),
            actions: Memo::new(),
            resources: Memo::new(),
            groups: Memo::new(),
            rules: Memo::new(),
            attributes: Memo::new(),
            identity: Memo::new(),
        }
    }

    /// Module this service answers for.
    #[must_use]
    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    /// Consumer this service answers for.
    #[must_use]
    pub fn consumer(&self) -> &ConsumerKey {
        &self.consumer
    }

    /// Time since the service was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the service is older than `max_age`.
    #[must_use]
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }

    /// Mark every decision of this service as stale. From now on each
    /// decision fails with [`AuthzError::Invalidated`].
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    /// Whether [`CachedSecurityService::invalidate`] has been called.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// Whether the consumer may perform `action`.
    ///
    /// Without a direct grant, falls back to a resource check on
    /// `(ALL, ALL, action)`.
    pub fn can_perform_action(&self, action: &str) -> AuthzResult<bool> {
        self.decide(|deadline| self.action(action, deadline))
    }

    /// Whether the consumer is a member of `group`.
    ///
    /// Membership is what the backend reports; without it, any group the
    /// module has permission rules for counts.
    pub fn is_in_group(&self, group: &str) -> AuthzResult<bool> {
        self.decide(|deadline| self.group(group, deadline))
    }

    /// Whether the consumer may perform `action` on the given resource.
    pub fn can_access_resource(
        &self,
        resource_class: &str,
        resource_id: &str,
        action: &str,
    ) -> AuthzResult<bool> {
        let requested = ResourcePermission::new(resource_class, resource_id, action);
        self.decide(|deadline| self.resource(&requested, deadline))
    }

    /// Whether the consumer may perform any action on the given resource.
    pub fn can_access_resource_any_action(
        &self,
        resource_class: &str,
        resource_id: &str,
    ) -> AuthzResult<bool> {
        self.can_access_resource(resource_class, resource_id, ResourcePermission::ALL)
    }

    /// Attributes of the consumer, loaded at most once.
    pub fn user_attributes(&self) -> AuthzResult<Arc<UserAttributes>> {
        self.decide(|deadline| {
            self.attributes
                .get_or_load(&(), deadline, || self.timed_out("attributes"), || {
                    self.call("attributes", deadline, |b, l| b.load_attributes(l))
                        .map(Arc::new)
                })
        })
    }

    /// Identity details of the consumer, loaded at most once.
    pub fn identity(&self) -> AuthzResult<Option<ConsumerIdentity>> {
        self.decide(|deadline| {
            self.identity
                .get_or_load(&(), deadline, || self.timed_out("identity"), || {
                    self.call("identity", deadline, |b, l| b.load_identity(l))
                })
        })
    }

    /// Display user name of the consumer, if known.
    pub fn username(&self) -> AuthzResult<Option<String>> {
        Ok(self.identity()?.map(|i| i.username))
    }

    /// Class of the consumer, if known.
    pub fn user_class(&self) -> AuthzResult<Option<String>> {
        Ok(self.identity()?.map(|i| i.user_class))
    }

    /// Answer one decision before a fresh deadline, refusing to answer from
    /// an invalidated service before or after resolving it.
    fn decide<T>(&self, f: impl FnOnce(Instant) -> AuthzResult<T>) -> AuthzResult<T> {
        self.ensure_current()?;
        let answer = f(Instant::now() + self.backend_timeout)?;
        self.ensure_current()?;
        Ok(answer)
    }

    fn ensure_current(&self) -> AuthzResult<()> {
        if self.is_invalidated() {
            return Err(AuthzError::Invalidated {
                module: self.module.clone(),
                consumer: self.consumer.clone(),
            });
        }
        Ok(())
    }

    fn action(&self, action: &str, deadline: Instant) -> AuthzResult<bool> {
        self.actions
            .get_or_load(action, deadline, || self.timed_out("action"), || {
                let decision = self.call("action", deadline, |b, l| b.load_action(l, action))?
                    || self.resource(
                        &ResourcePermission::new(
                            ResourcePermission::ALL,
                            ResourcePermission::ALL,
                            action,
                        ),
                        deadline,
                    )?;
                debug!(
                    module = %self.module,
                    consumer = %self.consumer,
                    action,
                    decision,
                    "Cached action decision"
                );
                Ok(decision)
            })
    }

    fn group(&self, group: &str, deadline: Instant) -> AuthzResult<bool> {
        self.groups
            .get_or_load(group, deadline, || self.timed_out("group"), || {
                let decision = self.call("group", deadline, |b, l| b.load_group(l, group))?
                    || self.rules(deadline)?.contains_key(group);
                debug!(
                    module = %self.module,
                    consumer = %self.consumer,
                    group,
                    decision,
                    "Cached group decision"
                );
                Ok(decision)
            })
    }

    fn resource(&self, requested: &ResourcePermission, deadline: Instant) -> AuthzResult<bool> {
        self.resources
            .get_or_load(requested, deadline, || self.timed_out("resource"), || {
                let decision = self.load_resource_access(requested, deadline)?;
                debug!(
                    module = %self.module,
                    consumer = %self.consumer,
                    permission = %requested,
                    decision,
                    "Cached resource decision"
                );
                Ok(decision)
            })
    }

    fn load_resource_access(
        &self,
        requested: &ResourcePermission,
        deadline: Instant,
    ) -> AuthzResult<bool> {
        if self.call("resource", deadline, |b, l| {
            b.load_resource_access(l, requested)
        })? {
            return Ok(true);
        }

        let rules = self.rules(deadline)?;
        for (group, permissions) in rules.iter() {
            let grants = permissions.iter().any(|p| p.can_access(requested));
            if grants && self.group(group, deadline)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn rules(&self, deadline: Instant) -> AuthzResult<Arc<GroupPermissions>> {
        self.rules
            .get_or_load(&(), deadline, || self.timed_out("rules"), || {
                self.call("rules", deadline, |b, l| b.module_permission_rules(l))
                    .map(Arc::new)
            })
    }

    /// Run one backend lookup bounded by `deadline`. A lookup that finishes
    /// after the deadline is discarded as [`BackendError::Timeout`].
    fn call<T>(
        &self,
        lookup: &'static str,
        deadline: Instant,
        f: impl FnOnce(&dyn PermissionBackend, &Lookup<'_>) -> Result<T, BackendError>,
    ) -> AuthzResult<T> {
        let request = Lookup::until(&self.module, &self.consumer, deadline);
        let result = if request.is_overdue() {
            Err(BackendError::Timeout(self.backend_timeout))
        } else {
            match f(self.backend.as_ref(), &request) {
                Ok(_) if request.is_overdue() => Err(BackendError::Timeout(self.backend_timeout)),
                other => other,
            }
        };
        result.map_err(|source| self.unavailable(lookup, source))
    }

    /// Another caller is still resolving the same decision and did not
    /// finish before the deadline.
    fn timed_out(&self, lookup: &'static str) -> AuthzError {
        self.unavailable(lookup, BackendError::Timeout(self.backend_timeout))
    }

    fn unavailable(&self, lookup: &'static str, source: BackendError) -> AuthzError {
        warn!(
            module = %self.module,
            consumer = %self.consumer,
            lookup,
            error = %source,
            "Permission backend lookup failed"
        );
        AuthzError::BackendUnavailable {
            module: self.module.clone(),
            consumer: self.consumer.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::backend::StaticPermissionBackend;

    #[derive(Debug, Default)]
    struct CountingBackend {
        inner: StaticPermissionBackend,
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
    }

    impl CountingBackend {
        fn record(&self) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(BackendError::Unavailable("down".to_owned()));
            }
            Ok(())
        }
    }

    impl PermissionBackend for CountingBackend {
        fn load_action(&self, lookup: &Lookup<'_>, action: &str) -> Result<bool, BackendError> {
            self.record()?;
            self.inner.load_action(lookup, action)
        }

        fn load_group(&self, lookup: &Lookup<'_>, group: &str) -> Result<bool, BackendError> {
            self.record()?;
            self.inner.load_group(lookup, group)
        }

        fn load_resource_access(
            &self,
            lookup: &Lookup<'_>,
            permission: &ResourcePermission,
        ) -> Result<bool, BackendError> {
            self.record()?;
            self.inner.load_resource_access(lookup, permission)
        }

        fn load_attributes(&self, lookup: &Lookup<'_>) -> Result<UserAttributes, BackendError> {
            self.record()?;
            self.inner.load_attributes(lookup)
        }

        fn load_identity(
            &self,
            lookup: &Lookup<'_>,
        ) -> Result<Option<ConsumerIdentity>, BackendError> {
            self.record()?;
            self.inner.load_identity(lookup)
        }

        fn module_permission_rules(
            &self,
            lookup: &Lookup<'_>,
        ) -> Result<GroupPermissions, BackendError> {
            self.record()?;
            self.inner.module_permission_rules(lookup)
        }
    }

    /// Answers `view` at once and sleeps on `export` until the deadline
    /// has long passed.
    #[derive(Debug)]
    struct SlowExportBackend;

    impl PermissionBackend for SlowExportBackend {
        fn load_action(&self, lookup: &Lookup<'_>, action: &str) -> Result<bool, BackendError> {
            if action == "export" {
                std::thread::sleep(lookup.remaining() + Duration::from_millis(150));
            }
            Ok(true)
        }
    }

    fn module() -> ModuleName {
        ModuleName::new("geo").unwrap()
    }

    fn c1() -> ConsumerKey {
        ConsumerKey::new("c1")
    }

    fn service(backend: Arc<CountingBackend>) -> CachedSecurityService {
        CachedSecurityService::new(module(), c1(), backend, Duration::from_secs(5))
    }

    #[test]
    fn test_should_memoize_direct_action_grant() {
        let backend = Arc::new(CountingBackend {
            inner: StaticPermissionBackend::new().grant_action(&module(), &c1(), "view"),
            ..CountingBackend::default()
        });
        let service = service(Arc::clone(&backend));

        for _ in 0..3 {
            assert!(service.can_perform_action("view").unwrap());
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_should_memoize_denial() {
        let backend = Arc::new(CountingBackend::default());
        let service = service(Arc::clone(&backend));

        assert!(!service.can_perform_action("edit").unwrap());
        let calls = backend.calls.load(Ordering::SeqCst);
        assert!(!service.can_perform_action("edit").unwrap());
        assert_eq!(backend.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_should_fall_back_to_group_rules_for_actions() {
        let backend = Arc::new(CountingBackend {
            inner: StaticPermissionBackend::new()
                .grant_group(&module(), &c1(), "USER")
                .with_rule(&module(), "USER", ResourcePermission::new("report", "1", "view")),
            ..CountingBackend::default()
        });
        let service = service(backend);

        assert!(service.can_perform_action("view").unwrap());
        assert!(!service.can_perform_action("delete").unwrap());
        assert!(service.can_access_resource("report", "1", "view").unwrap());
        assert!(!service.can_access_resource("report", "2", "view").unwrap());
        assert!(service.can_access_resource_any_action("report", "1").unwrap());
        assert!(service.is_in_group("USER").unwrap());
        assert!(!service.is_in_group("ADMIN").unwrap());
    }

    #[test]
    fn test_should_count_groups_configured_in_module_rules() {
        let backend = Arc::new(CountingBackend {
            inner: StaticPermissionBackend::new()
                .with_rule(&module(), "USER", ResourcePermission::new("report", "1", "view")),
            ..CountingBackend::default()
        });
        let service = service(backend);

        assert!(service.is_in_group("USER").unwrap());
        assert!(!service.is_in_group("ADMIN").unwrap());
        assert!(service.can_access_resource("report", "1", "view").unwrap());
    }

    #[test]
    fn test_should_not_cache_backend_failure() {
        let backend = Arc::new(CountingBackend {
            failing: AtomicBool::new(true),
            inner: StaticPermissionBackend::new().grant_action(&module(), &c1(), "view"),
            ..CountingBackend::default()
        });
        let service = service(Arc::clone(&backend));

        assert!(matches!(
            service.can_perform_action("view"),
            Err(AuthzError::BackendUnavailable {
                source: BackendError::Unavailable(_),
                ..
            })
        ));

        backend.failing.store(false, Ordering::SeqCst);
        assert!(service.can_perform_action("view").unwrap());
    }

    #[test]
    fn test_should_fail_closed_on_slow_backend() {
        let backend = Arc::new(CountingBackend {
            delay: Duration::from_millis(30),
            inner: StaticPermissionBackend::allow_all(),
            ..CountingBackend::default()
        });
        let service =
            CachedSecurityService::new(module(), c1(), backend, Duration::from_millis(1));

        assert!(matches!(
            service.is_in_group("USER"),
            Err(AuthzError::BackendUnavailable {
                source: BackendError::Timeout(_),
                ..
            })
        ));
    }

    #[test]
    fn test_should_not_block_other_decisions_behind_a_slow_lookup() {
        let service = Arc::new(CachedSecurityService::new(
            module(),
            c1(),
            Arc::new(SlowExportBackend),
            Duration::from_millis(100),
        ));

        let slow = {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.can_perform_action("export"))
        };
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert!(service.can_perform_action("view").unwrap());
        assert!(started.elapsed() < Duration::from_millis(80));

        let started = Instant::now();
        assert!(matches!(
            service.can_perform_action("export"),
            Err(AuthzError::BackendUnavailable {
                source: BackendError::Timeout(_),
                ..
            })
        ));
        assert!(started.elapsed() < Duration::from_millis(200));

        assert!(matches!(
            slow.join().unwrap(),
            Err(AuthzError::BackendUnavailable {
                source: BackendError::Timeout(_),
                ..
            })
        ));
    }

    #[test]
    fn test_should_refuse_to_answer_once_invalidated() {
        let backend = Arc::new(CountingBackend {
            inner: StaticPermissionBackend::new().grant_action(&module(), &c1(), "view"),
            ..CountingBackend::default()
        });
        let service = service(Arc::clone(&backend));
        assert!(service.can_perform_action("view").unwrap());

        service.invalidate();
        assert!(service.is_invalidated());
        assert_eq!(
            service.can_perform_action("view"),
            Err(AuthzError::Invalidated {
                module: module(),
                consumer: c1(),
            })
        );
        assert!(matches!(service.is_in_group("USER"), Err(AuthzError::Invalidated { .. })));
        assert!(matches!(service.identity(), Err(AuthzError::Invalidated { .. })));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_should_load_attributes_and_identity_once() {
        let backend = Arc::new(CountingBackend {
            inner: StaticPermissionBackend::new()
                .with_attribute(&module(), &c1(), "quota", serde_json::json!(5))
                .with_identity(
                    &c1(),
                    ConsumerIdentity {
                        username: "Carol".to_owned(),
                        user_class: "EXTERNAL".to_owned(),
                    },
                ),
            ..CountingBackend::default()
        });
        let service = service(Arc::clone(&backend));

        assert_eq!(service.user_attributes().unwrap()["quota"], serde_json::json!(5));
        assert_eq!(service.user_attributes().unwrap().len(), 1);
        assert_eq!(service.username().unwrap().as_deref(), Some("Carol"));
        assert_eq!(service.user_class().unwrap().as_deref(), Some("EXTERNAL"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_should_call_backend_once_under_contention() {
        let backend = Arc::new(CountingBackend {
            delay: Duration::from_millis(20),
            inner: StaticPermissionBackend::new().grant_group(&module(), &c1(), "USER"),
            ..CountingBackend::default()
        });
        let service = Arc::new(service(Arc::clone(&backend)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || service.is_in_group("USER").unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_should_report_expiry() {
        let service = service(Arc::new(CountingBackend::default()));
        assert!(!service.is_expired(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(2));
        assert!(service.is_expired(Duration::ZERO));
    }
}
