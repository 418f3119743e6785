// Destination Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator placed between the environment prefix and the logical queue name
pub const PREFIX_SEPARATOR: &str = "_";

/// Physical queue name, after prefix resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Destination(String);

impl Destination {
    /// Wrap an already-physical name; no prefix is applied
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Destination {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps logical queue names to destinations.
///
/// Producers and consumers of the same logical queue must resolve through
/// resolvers built from the same prefix, otherwise they talk to two disjoint
/// physical queues and nothing reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueNameResolver {
    prefix: String,
}

impl QueueNameResolver {
    /// Create a resolver with an environment prefix (empty = no prefix)
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Resolver that returns every name unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a logical queue name to its destination
    ///
    /// # Example
    /// ```text
    /// QueueNameResolver::new("env").resolve("general_msg_queue") // env_general_msg_queue
    /// QueueNameResolver::identity().resolve("general_msg_queue") // general_msg_queue
    /// ```
    pub fn resolve(&self, queue_name: &str) -> Destination {
        if self.prefix.is_empty() {
            return Destination(queue_name.to_string());
        }
        Destination(format!("{}{}{}", self.prefix, PREFIX_SEPARATOR, queue_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_prefix() {
        let resolver = QueueNameResolver::new("env");
        assert_eq!(
            resolver.resolve("general_msg_queue").as_str(),
            "env_general_msg_queue"
        );
    }

    #[test]
    fn test_resolve_empty_prefix_is_identity() {
        let resolver = QueueNameResolver::identity();
        for name in ["general_msg_queue", "Q", "a_b_c", ""] {
            assert_eq!(resolver.resolve(name).as_str(), name);
        }
    }

    #[test]
    fn test_resolve_is_stable() {
        let resolver = QueueNameResolver::new("staging");
        assert_eq!(resolver.resolve("orders"), resolver.resolve("orders"));
        assert_ne!(
            resolver.resolve("orders"),
            QueueNameResolver::new("prod").resolve("orders")
        );
    }
}
