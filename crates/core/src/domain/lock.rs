// Lock Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one protected execution, used to prove ownership to the
/// cluster-wide lock (there is no "current thread" across await points).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockOwner(String);

impl LockOwner {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two levels of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockGate {
    /// Process-local mutex keyed by lock name
    Local,
    /// Cluster-wide lock of the same name
    Distributed,
}

impl fmt::Display for LockGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockGate::Local => write!(f, "local"),
            LockGate::Distributed => write!(f, "distributed"),
        }
    }
}
