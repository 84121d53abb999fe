//! Request id generation.
//!
//! # Why request ids? (for beginners)
//!
//! HCP multiplexes many requests over one socket.  Responses may come back in
//! any order, so every request carries a `requestId` in its header and the
//! server echoes it verbatim in the response.  The client matches the two by
//! comparing ids, which therefore must never repeat within a process.
//!
//! # Format
//!
//! `<random>-<millis>-<counter>`:
//!
//! - `random` – 12 hex digits from a v4 UUID, so ids from different processes
//!   (or from before a restart) are very unlikely to collide;
//! - `millis` – milliseconds since the Unix epoch, in hex;
//! - `counter` – a per-generator atomic counter, so two ids minted in the same
//!   millisecond by the same generator always differ.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// A thread-safe generator of unique request ids.
///
/// # Examples
///
/// ```rust
/// use hcp_core::RequestIdGenerator;
///
/// let ids = RequestIdGenerator::new();
/// assert_ne!(ids.next(), ids.next());
/// ```
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    counter: AtomicU64,
}

impl RequestIdGenerator {
    /// Creates a new generator whose counter starts at 0.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Returns a fresh request id.
    pub fn next(&self) -> String {
        // `fetch_add` wraps at u64::MAX; the random part keeps ids distinct
        // even then.
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let random = Uuid::new_v4().simple().to_string();
        format!("{}-{:x}-{count}", &random[..12], current_millis())
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Returns a fresh id from the process-wide generator.
pub fn next_request_id() -> String {
    static GENERATOR: OnceLock<RequestIdGenerator> = OnceLock::new();
    GENERATOR.get_or_init(RequestIdGenerator::new).next()
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
