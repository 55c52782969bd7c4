//! Static accounts and permissions loaded from a JSON policy file.
//!
//! ```json
//! {
//!   "allowAll": false,
//!   "accounts": [
//!     { "key": "c1", "secret": "p1", "groups": ["ADMIN"], "username": "Carol" }
//!   ],
//!   "grants": [
//!     { "module": "geo", "consumer": "c1", "actions": ["view"], "groups": ["USER"] }
//!   ],
//!   "rules": [
//!     { "module": "geo", "group": "USER",
//!       "permissions": [{ "resourceClass": "report", "action": "view" }] }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tollgate_auth::{StaticIdentityBackend, UserRecord};
use tollgate_authz::{ConsumerIdentity, ResourcePermission, StaticPermissionBackend};
use tollgate_core::{ConsumerKey, ModuleName};
use tracing::info;

/// Environment variable naming the policy file.
pub const POLICY_FILE_ENV: &str = "TOLLGATE_POLICY_FILE";

/// Contents of a policy file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Policy {
    /// Grant every authorization question.
    pub allow_all: bool,
    /// Accounts usable with Digest and OAuth.
    pub accounts: Vec<AccountPolicy>,
    /// Direct grants per (module, consumer).
    pub grants: Vec<GrantPolicy>,
    /// Group permission rules per module.
    pub rules: Vec<RulePolicy>,
}

/// One account.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPolicy {
    /// Consumer key, also the Digest user name.
    pub key: String,
    /// Consumer secret, also the Digest password.
    pub secret: String,
    /// Authorities granted to the account.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Disabled accounts fail Digest authentication.
    #[serde(default = "enabled")]
    pub active: bool,
    /// Display user name.
    #[serde(default)]
    pub username: Option<String>,
    /// Class of user.
    #[serde(default)]
    pub user_class: Option<String>,
}

fn enabled() -> bool {
    true
}

/// Direct grants for one consumer in one module.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantPolicy {
    /// Module name.
    pub module: String,
    /// Consumer key.
    pub consumer: String,
    /// Granted actions.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Module groups the consumer belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Granted resource permissions.
    #[serde(default)]
    pub resources: Vec<ResourcePermission>,
    /// Consumer attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// Permissions of one group in one module.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePolicy {
    /// Module name.
    pub module: String,
    /// Group name.
    pub group: String,
    /// Permissions granted to the group's members.
    pub permissions: Vec<ResourcePermission>,
}

impl Policy {
    /// Load the file named by [`POLICY_FILE_ENV`], or an empty policy when
    /// the variable is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(POLICY_FILE_ENV) {
            Ok(path) if !path.is_empty() => Self::load(&path),
            _ => {
                info!("no policy file configured, starting with an empty policy");
                Ok(Self::default())
            }
        }
    }

    /// Load a policy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy file {}", path.display()))?;
        let policy = Self::parse(&raw)
            .with_context(|| format!("invalid policy file {}", path.display()))?;
        info!(
            path = %path.display(),
            accounts = policy.accounts.len(),
            grants = policy.grants.len(),
            rules = policy.rules.len(),
            "loaded policy file"
        );
        Ok(policy)
    }

    /// Parse policy JSON.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("policy is not valid JSON")
    }

    /// Accounts as an identity backend.
    #[must_use]
    pub fn identity_backend(&self) -> StaticIdentityBackend {
        self.accounts
            .iter()
            .fold(StaticIdentityBackend::new(), |backend, account| {
                if account.active {
                    backend.with_account(&account.key, &account.secret, &account.groups)
                } else {
                    backend.with_user(
                        UserRecord::new(&account.key, &account.secret)
                            .with_groups(&account.groups)
                            .disabled(),
                    )
                }
            })
    }

    /// Grants, rules and account identities as a permission backend.
    pub fn permission_backend(&self) -> Result<StaticPermissionBackend> {
        let mut backend = if self.allow_all {
            StaticPermissionBackend::allow_all()
        } else {
            StaticPermissionBackend::new()
        };

        for grant in &self.grants {
            let module = ModuleName::new(grant.module.as_str())?;
            let consumer = ConsumerKey::new(grant.consumer.as_str());
            for action in &grant.actions {
                backend = backend.grant_action(&module, &consumer, action);
            }
            for group in &grant.groups {
                backend = backend.grant_group(&module, &consumer, group);
            }
            for permission in &grant.resources {
                backend = backend.grant_resource(&module, &consumer, permission.clone());
            }
            for (name, value) in &grant.attributes {
                backend = backend.with_attribute(&module, &consumer, name, value.clone());
            }
        }

        for rule in &self.rules {
            let module = ModuleName::new(rule.module.as_str())?;
            for permission in &rule.permissions {
                backend = backend.with_rule(&module, &rule.group, permission.clone());
            }
        }

        for account in &self.accounts {
            if let Some(username) = &account.username {
                backend = backend.with_identity(
                    &ConsumerKey::new(account.key.as_str()),
                    ConsumerIdentity {
                        username: username.clone(),
                        user_class: account.user_class.clone().unwrap_or_default(),
                    },
                );
            }
        }

        Ok(backend)
    }
}
