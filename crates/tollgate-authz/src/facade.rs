//! Single entry point for authorization questions.

use std::sync::Arc;

use tollgate_core::{ConsumerKey, ModuleName};
use tracing::warn;

use crate::backend::UserAttributes;
use crate::cache::DecisionCache;
use crate::error::AuthzResult;
use crate::event::{ModuleEvent, ModuleEventListener};
use crate::permission::ResourcePermission;
use crate::service::CachedSecurityService;

/// A question that can be put to [`AuthorizationFacade::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessQuery {
    /// May the consumer perform this action?
    Action(String),
    /// Is the consumer a member of this group?
    Group(String),
    /// May the consumer access this resource?
    Resource(ResourcePermission),
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Access is granted.
    Allow,
    /// Access is denied.
    Deny,
    /// The backend could not answer. Callers must treat this as a denial.
    Indeterminate,
}

impl AccessDecision {
    /// Whether access is granted.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

impl From<bool> for AccessDecision {
    fn from(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }
}

/// Routes authorization questions to the cached service of the caller's
/// (module, consumer) pair.
#[derive(Debug, Clone)]
pub struct AuthorizationFacade {
    cache: Arc<DecisionCache>,
}

impl AuthorizationFacade {
    /// Create a facade over `cache`.
    #[must_use]
    pub fn new(cache: Arc<DecisionCache>) -> Self {
        Self { cache }
    }

    /// The underlying cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<DecisionCache> {
        &self.cache
    }

    /// Whether `consumer` may perform `action` in `module`.
    pub fn can_perform_action(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        action: &str,
    ) -> AuthzResult<bool> {
        self.cache.decide(module, consumer, |s| s.can_perform_action(action))
    }

    /// Whether `consumer` is a member of `group` in `module`.
    pub fn is_in_group(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        group: &str,
    ) -> AuthzResult<bool> {
        self.cache.decide(module, consumer, |s| s.is_in_group(group))
    }

    /// Whether `consumer` may perform `action` on a resource of `module`.
    pub fn can_access_resource(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        resource_class: &str,
        resource_id: &str,
        action: &str,
    ) -> AuthzResult<bool> {
        self.cache.decide(module, consumer, |s| {
            s.can_access_resource(resource_class, resource_id, action)
        })
    }

    /// Whether `consumer` may perform any action on a resource of `module`.
    pub fn can_access_resource_any_action(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        resource_class: &str,
        resource_id: &str,
    ) -> AuthzResult<bool> {
        self.cache.decide(module, consumer, |s| {
            s.can_access_resource_any_action(resource_class, resource_id)
        })
    }

    /// Attributes of `consumer` in `module`.
    pub fn user_attributes(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
    ) -> AuthzResult<Arc<UserAttributes>> {
        self.cache.decide(module, consumer, CachedSecurityService::user_attributes)
    }

    /// Display user name of `consumer`, if known.
    pub fn username(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
    ) -> AuthzResult<Option<String>> {
        self.cache.decide(module, consumer, CachedSecurityService::username)
    }

    /// Class of `consumer`, if known.
    pub fn user_class(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
    ) -> AuthzResult<Option<String>> {
        self.cache.decide(module, consumer, CachedSecurityService::user_class)
    }

    /// Answer `query`, folding backend failures into
    /// [`AccessDecision::Indeterminate`].
    #[must_use]
    pub fn check(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        query: &AccessQuery,
    ) -> AccessDecision {
        let result = self.cache.decide(module, consumer, |service| match query {
            AccessQuery::Action(action) => service.can_perform_action(action),
            AccessQuery::Group(group) => service.is_in_group(group),
            AccessQuery::Resource(p) => {
                service.can_access_resource(p.resource_class(), p.resource_id(), p.action())
            }
        });
        match result {
            Ok(allowed) => allowed.into(),
            Err(e) => {
                warn!(%module, %consumer, error = %e, "Access check is indeterminate");
                AccessDecision::Indeterminate
            }
        }
    }
}

impl ModuleEventListener for AuthorizationFacade {
    fn module_changed(&self, event: &ModuleEvent) {
        self.cache.module_changed(event);
    }
}
