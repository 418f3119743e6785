// Listener constants
use std::time::Duration;

/// Pause after the queue backend reports an error, before blocking again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);
