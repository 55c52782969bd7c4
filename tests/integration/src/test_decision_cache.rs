//! Authorization decision cache scenarios.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use http::header::HOST;
    use tollgate_auth::sign_url;
    use tollgate_authz::{
        AccessDecision, AccessQuery, AuthorizationFacade, BackendError, DecisionCache,
        GroupPermissions, Lookup, ModuleAction, ModuleEvent, ModuleEventListener,
        PermissionBackend, ResourcePermission, StaticPermissionBackend,
    };
    use tollgate_core::{ConsumerKey, ModuleName};

    use crate::{HOST as API_HOST, authenticator, init_tracing, parts};

    /// Counts every lookup that reaches the policy store.
    #[derive(Debug)]
    struct CountingBackend {
        inner: StaticPermissionBackend,
        calls: AtomicUsize,
    }

    impl CountingBackend {
        fn new(inner: StaticPermissionBackend) -> Arc<Self> {
            Arc::new(Self {
                inner,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PermissionBackend for CountingBackend {
        fn load_action(&self, lookup: &Lookup<'_>, action: &str) -> Result<bool, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.inner.load_action(lookup, action)
        }

        fn load_group(&self, lookup: &Lookup<'_>, group: &str) -> Result<bool, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.load_group(lookup, group)
        }

        fn module_permission_rules(
            &self,
            lookup: &Lookup<'_>,
        ) -> Result<GroupPermissions, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.module_permission_rules(lookup)
        }
    }

    fn geo() -> ModuleName {
        ModuleName::new("geo").unwrap()
    }

    fn facade(backend: Arc<CountingBackend>) -> AuthorizationFacade {
        init_tracing();
        AuthorizationFacade::new(Arc::new(DecisionCache::new(backend)))
    }

    #[test]
    fn test_should_authenticate_then_authorize_from_cache() {
        let signed = sign_url(
            "GET",
            &format!("http://{API_HOST}/modules/geo/actions/view"),
            "c1",
            "p1",
        )
        .unwrap();
        let path = signed.strip_prefix(&format!("http://{API_HOST}")).unwrap();
        let request = parts(
            http::Request::get(path)
                .header(HOST, API_HOST)
                .body(())
                .unwrap(),
        );
        let consumer = authenticator()
            .authenticate(&request, b"")
            .unwrap()
            .consumer_key();

        let backend = CountingBackend::new(
            StaticPermissionBackend::new().grant_action(&geo(), &consumer, "view"),
        );
        let facade = facade(Arc::clone(&backend));

        for _ in 0..5 {
            assert!(facade.can_perform_action(&geo(), &consumer, "view").unwrap());
        }
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_should_reload_after_stop_and_security_change() {
        let c1 = ConsumerKey::new("c1");
        let backend = CountingBackend::new(
            StaticPermissionBackend::new().grant_action(&geo(), &c1, "view"),
        );
        let facade = facade(Arc::clone(&backend));

        assert!(facade.can_perform_action(&geo(), &c1, "view").unwrap());
        facade.module_changed(&ModuleEvent::new(geo(), ModuleAction::Start));
        assert!(facade.can_perform_action(&geo(), &c1, "view").unwrap());
        assert_eq!(backend.calls(), 1);

        facade.module_changed(&ModuleEvent::new(geo(), ModuleAction::Stop));
        assert!(facade.can_perform_action(&geo(), &c1, "view").unwrap());
        assert_eq!(backend.calls(), 2);

        facade.module_changed(&ModuleEvent::new(geo(), ModuleAction::SecurityChanged));
        assert!(facade.can_perform_action(&geo(), &c1, "view").unwrap());
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn test_should_leave_other_modules_cached_on_stop() {
        let c1 = ConsumerKey::new("c1");
        let billing = ModuleName::new("billing").unwrap();
        let backend = CountingBackend::new(
            StaticPermissionBackend::new()
                .grant_action(&geo(), &c1, "view")
                .grant_action(&billing, &c1, "pay"),
        );
        let facade = facade(Arc::clone(&backend));

        assert!(facade.can_perform_action(&geo(), &c1, "view").unwrap());
        assert!(facade.can_perform_action(&billing, &c1, "pay").unwrap());
        facade.module_changed(&ModuleEvent::new(geo(), ModuleAction::Stop));

        assert!(facade.can_perform_action(&billing, &c1, "pay").unwrap());
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn test_should_resolve_resources_through_group_rules() {
        let c1 = ConsumerKey::new("c1");
        let backend = CountingBackend::new(
            StaticPermissionBackend::new()
                .grant_group(&geo(), &c1, "ANALYST")
                .with_rule(&geo(), "ANALYST", ResourcePermission::new("report", "ALL", "view")),
        );
        let facade = facade(backend);

        let view = AccessQuery::Resource(ResourcePermission::new("report", "42", "view"));
        let edit = AccessQuery::Resource(ResourcePermission::new("report", "42", "edit"));
        assert_eq!(facade.check(&geo(), &c1, &view), AccessDecision::Allow);
        assert_eq!(facade.check(&geo(), &c1, &edit), AccessDecision::Deny);
        assert!(facade.can_perform_action(&geo(), &c1, "view").unwrap());
    }

    #[test]
    fn test_should_treat_groups_configured_for_the_module_as_membership() {
        let c1 = ConsumerKey::new("c1");
        let backend = CountingBackend::new(
            StaticPermissionBackend::new()
                .grant_group(&geo(), &c1, "ANALYST")
                .with_rule(&geo(), "EDITOR", ResourcePermission::new("report", "ALL", "edit")),
        );
        let facade = facade(backend);

        let editor = AccessQuery::Group("EDITOR".to_owned());
        let auditor = AccessQuery::Group("AUDITOR".to_owned());
        let edit = AccessQuery::Resource(ResourcePermission::new("report", "42", "edit"));
        assert_eq!(facade.check(&geo(), &c1, &editor), AccessDecision::Allow);
        assert_eq!(facade.check(&geo(), &c1, &auditor), AccessDecision::Deny);
        assert_eq!(facade.check(&geo(), &c1, &edit), AccessDecision::Allow);
    }

    #[test]
    fn test_should_answer_from_fresh_rules_after_security_change() {
        let c1 = ConsumerKey::new("c1");
        let backend = CountingBackend::new(
            StaticPermissionBackend::new().grant_action(&geo(), &c1, "view"),
        );
        let facade = facade(Arc::clone(&backend));

        let held = facade.cache().service(&geo(), &c1);
        assert!(held.can_perform_action("view").unwrap());
        facade.module_changed(&ModuleEvent::new(geo(), ModuleAction::SecurityChanged));

        assert!(held.can_perform_action("view").is_err());
        assert!(facade.can_perform_action(&geo(), &c1, "view").unwrap());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_share_one_service_across_tasks() {
        let c1 = ConsumerKey::new("c1");
        let backend = CountingBackend::new(
            StaticPermissionBackend::new().grant_action(&geo(), &c1, "view"),
        );
        let facade = facade(Arc::clone(&backend));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let facade = facade.clone();
                let c1 = c1.clone();
                tokio::task::spawn_blocking(move || facade.can_perform_action(&geo(), &c1, "view"))
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }

        assert_eq!(backend.calls(), 1);
        assert_eq!(facade.cache().len(), 1);
    }
}
