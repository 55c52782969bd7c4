//! Resource permissions with wildcard matching.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Permissions granted to each group of a module, keyed by group name.
pub type GroupPermissions = HashMap<String, HashSet<ResourcePermission>>;

/// A (resource class, resource id, action) triple.
///
/// Any field may be the wildcard [`ResourcePermission::ALL`]. Empty values
/// are treated as the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PermissionFields")]
pub struct ResourcePermission {
    resource_class: String,
    resource_id: String,
    action: String,
}

/// Wire form of [`ResourcePermission`]; converted through
/// [`ResourcePermission::new`] so missing and empty fields become `ALL`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionFields {
    #[serde(default)]
    resource_class: String,
    #[serde(default)]
    resource_id: String,
    #[serde(default)]
    action: String,
}

impl From<PermissionFields> for ResourcePermission {
    fn from(fields: PermissionFields) -> Self {
        Self::new(fields.resource_class, fields.resource_id, fields.action)
    }
}

fn wildcard() -> String {
    ResourcePermission::ALL.to_owned()
}

fn or_all(value: impl Into<String>) -> String {
    let value = value.into();
    if value.trim().is_empty() { wildcard() } else { value }
}

fn equal_or_all(granted: &str, requested: &str) -> bool {
    granted == ResourcePermission::ALL
        || requested == ResourcePermission::ALL
        || granted == requested
}

impl ResourcePermission {
    /// Wildcard matching any value.
    pub const ALL: &str = "ALL";

    /// Create a permission. Empty fields become [`Self::ALL`].
    #[must_use]
    pub fn new(
        resource_class: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            resource_class: or_all(resource_class),
            resource_id: or_all(resource_id),
            action: or_all(action),
        }
    }

    /// A permission matching every resource and action.
    #[must_use]
    pub fn all() -> Self {
        Self::new(Self::ALL, Self::ALL, Self::ALL)
    }

    /// Resource class.
    #[must_use]
    pub fn resource_class(&self) -> &str {
        &self.resource_class
    }

    /// Resource id.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Action.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Whether this granted permission covers `requested`.
    ///
    /// Each field matches when the values are equal or either side is
    /// [`Self::ALL`].
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate_authz::ResourcePermission;
    ///
    /// let granted = ResourcePermission::new("report", "ALL", "view");
    /// assert!(granted.can_access(&ResourcePermission::new("report", "42", "view")));
    /// assert!(!granted.can_access(&ResourcePermission::new("report", "42", "edit")));
    /// ```
    #[must_use]
    pub fn can_access(&self, requested: &ResourcePermission) -> bool {
        equal_or_all(&self.resource_class, &requested.resource_class)
            && equal_or_all(&self.resource_id, &requested.resource_id)
            && equal_or_all(&self.action, &requested.action)
    }
}

impl fmt::Display for ResourcePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.resource_class, self.resource_id, self.action
        )
    }
}
