//! Module lifecycle events.

use std::fmt;
use std::str::FromStr;

use tollgate_core::ModuleName;

use crate::error::AuthzError;

/// Lifecycle transition of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleAction {
    /// The module started.
    Start,
    /// The module failed to start.
    StartFailed,
    /// The module stopped.
    Stop,
    /// The module's permission configuration changed.
    SecurityChanged,
}

impl ModuleAction {
    /// Wire name of the action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::StartFailed => "START_FAILED",
            Self::Stop => "STOP",
            Self::SecurityChanged => "SECURITY_CHANGED",
        }
    }
}

impl fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleAction {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START" => Ok(Self::Start),
            "START_FAILED" => Ok(Self::StartFailed),
            "STOP" => Ok(Self::Stop),
            "SECURITY_CHANGED" => Ok(Self::SecurityChanged),
            other => Err(AuthzError::UnknownModuleAction(other.to_owned())),
        }
    }
}

/// A lifecycle event for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEvent {
    /// Module the event is about.
    pub module: ModuleName,
    /// What happened.
    pub action: ModuleAction,
}

impl ModuleEvent {
    /// Create an event.
    #[must_use]
    pub fn new(module: ModuleName, action: ModuleAction) -> Self {
        Self { module, action }
    }

    /// Whether cached decisions for the module must be discarded.
    #[must_use]
    pub fn invalidates_security(&self) -> bool {
        matches!(self.action, ModuleAction::Stop | ModuleAction::SecurityChanged)
    }
}

/// Receives module events. Handling is synchronous: when
/// [`ModuleEventListener::module_changed`] returns, the event has taken effect.
pub trait ModuleEventListener: Send + Sync {
    /// Handle an event.
    fn module_changed(&self, event: &ModuleEvent);
}
