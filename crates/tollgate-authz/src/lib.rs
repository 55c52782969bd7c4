//! Per-module, per-consumer authorization decision cache for Tollgate.
//!
//! Modules are independently deployed business capabilities, each with its
//! own access rules. This crate answers "can consumer C do X in module M"
//! from a cache of boolean decisions partitioned by (module, consumer). A
//! cache miss is resolved through an injected [`PermissionBackend`]; a
//! backend failure is reported as an error and never cached.
//!
//! Cached entries expire after a fixed absolute age and are dropped at once
//! when their module stops or changes its security configuration (see
//! [`ModuleEvent`]).
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tollgate_authz::{AuthorizationFacade, DecisionCache, StaticPermissionBackend};
//! use tollgate_core::{ConsumerKey, ModuleName};
//!
//! let module = ModuleName::new("geocoder").unwrap();
//! let consumer = ConsumerKey::new("c1");
//! let backend = StaticPermissionBackend::new().grant_action(&module, &consumer, "view");
//!
//! let facade = AuthorizationFacade::new(Arc::new(DecisionCache::new(Arc::new(backend))));
//! assert!(facade.can_perform_action(&module, &consumer, "view").unwrap());
//! assert!(!facade.can_perform_action(&module, &consumer, "edit").unwrap());
//! ```

pub mod backend;
pub mod cache;
pub mod error;
pub mod event;
pub mod facade;
mod memo;
pub mod permission;
pub mod service;

pub use backend::{
    ConsumerIdentity, Lookup, PermissionBackend, StaticPermissionBackend, UserAttributes,
};
pub use cache::DecisionCache;
pub use error::{AuthzError, AuthzResult, BackendError};
pub use event::{ModuleAction, ModuleEvent, ModuleEventListener};
pub use facade::{AccessDecision, AccessQuery, AuthorizationFacade};
pub use permission::{GroupPermissions, ResourcePermission};
pub use service::CachedSecurityService;
