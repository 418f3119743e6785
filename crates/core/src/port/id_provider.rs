// ID Provider Port (lock owner tokens)

use crate::domain::LockOwner;

/// Source of unique owner tokens for protected executions
pub trait IdProvider: Send + Sync {
    /// Generate a new unique id
    fn generate_id(&self) -> String;

    /// Generate a fresh lock owner token
    fn next_owner(&self) -> LockOwner {
        LockOwner::new(self.generate_id())
    }
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
