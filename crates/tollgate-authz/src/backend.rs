//! Permission backend trait and an in-memory implementation.
//!
//! The [`PermissionBackend`] is consulted on every cache miss. Every method
//! has a default that grants nothing, so an implementation only overrides the
//! lookups its policy store supports.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use tollgate_core::{ConsumerKey, ModuleName};

use crate::error::BackendError;
use crate::permission::{GroupPermissions, ResourcePermission};

/// Free-form attributes of a consumer within a module.
pub type UserAttributes = HashMap<String, serde_json::Value>;

/// Identity details of a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerIdentity {
    /// Display user name.
    pub username: String,
    /// Class of user (e.g. internal or external account).
    pub user_class: String,
}

/// Who a backend lookup is for and when its answer stops being useful.
///
/// Backends that wait on I/O should give up once [`Lookup::remaining`] is
/// zero; a late answer is discarded anyway.
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    /// Module being queried.
    pub module: &'a ModuleName,
    /// Consumer being queried.
    pub consumer: &'a ConsumerKey,
    /// Instant after which the answer is discarded.
    pub deadline: Instant,
}

impl<'a> Lookup<'a> {
    /// A lookup that must finish within `timeout` from now.
    #[must_use]
    pub fn new(module: &'a ModuleName, consumer: &'a ConsumerKey, timeout: Duration) -> Self {
        Self::until(module, consumer, Instant::now() + timeout)
    }

    /// A lookup that must finish by `deadline`.
    #[must_use]
    pub fn until(module: &'a ModuleName, consumer: &'a ConsumerKey, deadline: Instant) -> Self {
        Self {
            module,
            consumer,
            deadline,
        }
    }

    /// Time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_overdue(&self) -> bool {
        Instant::now() > self.deadline
    }
}

/// Trait for resolving authorization decisions on a cache miss.
///
/// Implementations may block on I/O and should respect the deadline carried
/// by the [`Lookup`].
#[allow(unused_variables)]
pub trait PermissionBackend: Send + Sync + fmt::Debug {
    /// Whether the consumer is directly granted `action` in the module.
    fn load_action(&self, lookup: &Lookup<'_>, action: &str) -> Result<bool, BackendError> {
        Ok(false)
    }

    /// Whether the consumer is a member of `group` in the module.
    fn load_group(&self, lookup: &Lookup<'_>, group: &str) -> Result<bool, BackendError> {
        Ok(false)
    }

    /// Whether the consumer is directly granted `permission` in the module.
    fn load_resource_access(
        &self,
        lookup: &Lookup<'_>,
        permission: &ResourcePermission,
    ) -> Result<bool, BackendError> {
        Ok(false)
    }

    /// Attributes of the consumer in the module.
    fn load_attributes(&self, lookup: &Lookup<'_>) -> Result<UserAttributes, BackendError> {
        Ok(UserAttributes::new())
    }

    /// Identity details of the consumer, if known.
    fn load_identity(&self, lookup: &Lookup<'_>) -> Result<Option<ConsumerIdentity>, BackendError> {
        Ok(None)
    }

    /// Permissions granted to each group of the module.
    fn module_permission_rules(
        &self,
        lookup: &Lookup<'_>,
    ) -> Result<GroupPermissions, BackendError> {
        Ok(GroupPermissions::new())
    }
}

#[derive(Debug, Clone, Default)]
struct Grants {
    actions: HashSet<String>,
    groups: HashSet<String>,
    resources: HashSet<ResourcePermission>,
    attributes: UserAttributes,
}

/// An in-memory permission backend.
///
/// With [`StaticPermissionBackend::allow_all`] every direct lookup succeeds,
/// which is useful for development deployments.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tollgate_authz::{Lookup, PermissionBackend, ResourcePermission, StaticPermissionBackend};
/// use tollgate_core::{ConsumerKey, ModuleName};
///
/// let module = ModuleName::new("geo").unwrap();
/// let c1 = ConsumerKey::new("c1");
/// let backend = StaticPermissionBackend::new()
///     .grant_group(&module, &c1, "USER")
///     .with_rule(&module, "USER", ResourcePermission::new("report", "ALL", "view"));
///
/// let lookup = Lookup::new(&module, &c1, Duration::from_secs(1));
/// assert!(backend.load_group(&lookup, "USER").unwrap());
/// assert_eq!(backend.module_permission_rules(&lookup).unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionBackend {
    allow_all: bool,
    grants: HashMap<(ModuleName, ConsumerKey), Grants>,
    rules: HashMap<ModuleName, GroupPermissions>,
    identities: HashMap<ConsumerKey, ConsumerIdentity>,
}

impl StaticPermissionBackend {
    /// Create a backend that grants nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that grants every action, group and resource.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            ..Self::default()
        }
    }

    fn grants_mut(&mut self, module: &ModuleName, consumer: &ConsumerKey) -> &mut Grants {
        self.grants
            .entry((module.clone(), consumer.clone()))
            .or_default()
    }

    fn grants(&self, module: &ModuleName, consumer: &ConsumerKey) -> Option<&Grants> {
        self.grants.get(&(module.clone(), consumer.clone()))
    }

    /// Grant an action directly.
    #[must_use]
    pub fn grant_action(
        mut self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        action: &str,
    ) -> Self {
        self.grants_mut(module, consumer)
            .actions
            .insert(action.to_owned());
        self
    }

    /// Add the consumer to a group.
    #[must_use]
    pub fn grant_group(
        mut self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        group: &str,
    ) -> Self {
        self.grants_mut(module, consumer)
            .groups
            .insert(group.to_owned());
        self
    }

    /// Grant a resource permission directly.
    #[must_use]
    pub fn grant_resource(
        mut self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        permission: ResourcePermission,
    ) -> Self {
        self.grants_mut(module, consumer)
            .resources
            .insert(permission);
        self
    }

    /// Set an attribute of the consumer.
    #[must_use]
    pub fn with_attribute(
        mut self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        name: &str,
        value: serde_json::Value,
    ) -> Self {
        self.grants_mut(module, consumer)
            .attributes
            .insert(name.to_owned(), value);
        self
    }

    /// Grant `permission` to every member of `group` in `module`.
    #[must_use]
    pub fn with_rule(
        mut self,
        module: &ModuleName,
        group: &str,
        permission: ResourcePermission,
    ) -> Self {
        self.rules
            .entry(module.clone())
            .or_default()
            .entry(group.to_owned())
            .or_default()
            .insert(permission);
        self
    }

    /// Record identity details of a consumer.
    #[must_use]
    pub fn with_identity(mut self, consumer: &ConsumerKey, identity: ConsumerIdentity) -> Self {
        self.identities.insert(consumer.clone(), identity);
        self
    }
}

impl PermissionBackend for StaticPermissionBackend {
    fn load_action(&self, lookup: &Lookup<'_>, action: &str) -> Result<bool, BackendError> {
        Ok(self.allow_all
            || self
                .grants(lookup.module, lookup.consumer)
                .is_some_and(|g| g.actions.contains(action)))
    }

    fn load_group(&self, lookup: &Lookup<'_>, group: &str) -> Result<bool, BackendError> {
        Ok(self.allow_all
            || self
                .grants(lookup.module, lookup.consumer)
                .is_some_and(|g| g.groups.contains(group)))
    }

    fn load_resource_access(
        &self,
        lookup: &Lookup<'_>,
        permission: &ResourcePermission,
    ) -> Result<bool, BackendError> {
        Ok(self.allow_all
            || self
                .grants(lookup.module, lookup.consumer)
                .is_some_and(|g| g.resources.contains(permission)))
    }

    fn load_attributes(&self, lookup: &Lookup<'_>) -> Result<UserAttributes, BackendError> {
        Ok(self
            .grants(lookup.module, lookup.consumer)
            .map(|g| g.attributes.clone())
            .unwrap_or_default())
    }

    fn load_identity(&self, lookup: &Lookup<'_>) -> Result<Option<ConsumerIdentity>, BackendError> {
        Ok(self.identities.get(lookup.consumer).cloned())
    }

    fn module_permission_rules(
        &self,
        lookup: &Lookup<'_>,
    ) -> Result<GroupPermissions, BackendError> {
        Ok(self.rules.get(lookup.module).cloned().unwrap_or_default())
    }
}
