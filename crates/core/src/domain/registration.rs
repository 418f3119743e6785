// Listener Registration Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of listener replicas per registration
pub const DEFAULT_REPLICAS: usize = 1;

/// Which queue a listener blocks on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    /// Pops from the plain blocking queue only
    Plain,
    /// Attaches the delayed-activation companion first, then pops from the blocking queue
    Delayed,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::Plain => write!(f, "plain"),
            ListenerKind::Delayed => write!(f, "delayed"),
        }
    }
}

/// Worker pool a registration dispatches into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PoolSelector {
    /// Process-wide default pool (2 x available parallelism)
    #[default]
    Default,
    /// Pool registered under this name; falls back to the default when unknown
    Named(String),
}

impl PoolSelector {
    pub fn named(name: impl Into<String>) -> Self {
        PoolSelector::Named(name.into())
    }
}

impl fmt::Display for PoolSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolSelector::Default => write!(f, "default"),
            PoolSelector::Named(name) => write!(f, "{}", name),
        }
    }
}
