//! Size and timing constants, per `spec.md` §3 and §4.6.

use std::time::Duration;

/// Hard maximum key size imposed by the underlying device. Keys longer than
/// this fail with [`crate::error::Error::InvalidArgument`].
pub const MAX_KEY_LEN: usize = 4096;

/// Cleaner byte threshold: an object whose cache has accumulated at least
/// this many unflushed bytes since the last clean makes the cleaner skip
/// its back-off sleep.
pub const CLEANER_BYTE_LIMIT: u64 = 10 * 1024 * 1024;

/// Cleaner ops threshold, derived as `BYTELIMIT / (2 * 20)` per `spec.md` §4.6.
pub const CLEANER_OPS_LIMIT: u64 = CLEANER_BYTE_LIMIT / (2 * 20);

/// Initial cleaner back-off sleep.
pub const CLEANER_BACKOFF_MIN: Duration = Duration::from_secs(1);

/// Maximum cleaner back-off sleep.
pub const CLEANER_BACKOFF_MAX: Duration = Duration::from_secs(5);
