// This module contains all the constants that affect the behavior of the file store.

/// Default address of the coordinator that peers register with.
pub const DEFAULT_COORDINATOR_ADDRESS: &str = "127.0.0.1:8000";

/// Default port the coordinator listens on.
pub const DEFAULT_COORDINATOR_PORT: u16 = 8000;

/// Host advertised to the coordinator when no other is configured.
pub const DEFAULT_ADVERTISE_HOST: &str = "127.0.0.1";

/// Name prefix of cached copies inside a peer's mounted directory.
/// Entries carrying it are never treated as owned files.
pub const CACHE_FILE_PREFIX: &str = "dfs_";

/// Suffix of partially written cached copies. Renamed into place once complete.
pub const PARTIAL_FILE_SUFFIX: &str = ".part";

/// # Sync loop period.
/// Every tick the peer rescans its directory and sends one heartbeat.
pub const DEFAULT_SYNC_INTERVAL_S: u64 = 10;

/// Upper bound for any single outbound call (connect, send and receive).
pub const DEFAULT_REQUEST_TIMEOUT_MILLISECONDS: u64 = 2500;

/// How many times a download is attempted before giving up.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Delay before the second download attempt. Doubles on every further attempt.
pub const DEFAULT_RETRY_BACKOFF_MILLISECONDS: u64 = 200;

/// Largest message accepted on the wire, in MB.
/// Messages are buffered whole before parsing, so this is also the memory bound of every open
/// connection, inbound or outbound. File content is hex encoded, so the largest transferable
/// file is half of this.
pub const MAX_MESSAGE_SIZE_MB: usize = 256;

/// Sender name used by the coordinator in outgoing envelopes.
pub const COORDINATOR_SENDER_NAME: &str = "coordinator";
