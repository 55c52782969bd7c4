//! Identifier types shared across the gateway.

use std::fmt;

/// Name of a deployed module (a business capability with its own access rules).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ModuleName(String);

impl ModuleName {
    /// Create a new module name.
    ///
    /// # Errors
    /// Returns an error if the name is empty or contains a `/`.
    pub fn new(name: impl Into<String>) -> Result<Self, crate::TollgateError> {
        let name = name.into();
        if name.trim().is_empty() || name.contains('/') {
            return Err(crate::TollgateError::InvalidModuleName(name));
        }
        Ok(Self(name))
    }

    /// Get the module name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an authenticated caller: the Digest username or the OAuth
/// consumer key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConsumerKey(String);

impl ConsumerKey {
    /// Create a new consumer key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the consumer key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConsumerKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for ConsumerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_valid_module_name() {
        let name = ModuleName::new("billing").unwrap();
        assert_eq!(name.as_str(), "billing");
        assert_eq!(name.to_string(), "billing");
    }

    #[test]
    fn test_should_reject_invalid_module_name() {
        assert!(ModuleName::new("").is_err());
        assert!(ModuleName::new("   ").is_err());
        assert!(ModuleName::new("a/b").is_err());
    }

    #[test]
    fn test_should_create_consumer_key() {
        let key = ConsumerKey::from("c1");
        assert_eq!(key.as_str(), "c1");
        assert_eq!(key, ConsumerKey::new(String::from("c1")));
    }
}
