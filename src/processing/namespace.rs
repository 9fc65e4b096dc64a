//! Upload namespace minting and age-based selection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const UPLOAD_PREFIX: &str = "upload-";
const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Mints `upload-<unix-millis>` namespaces that never repeat within a process.
#[derive(Debug, Default)]
pub struct NamespaceGenerator {
    last: AtomicU64,
}

impl NamespaceGenerator {
    /// Create a generator with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next namespace, using the wall clock unless it would not move past the previous value.
    pub fn next(&self) -> String {
        let now = now_millis();
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        format!("{UPLOAD_PREFIX}{}", now.max(previous + 1))
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Timestamp encoded in a namespace minted by [`NamespaceGenerator`].
pub fn parse_upload_timestamp(namespace: &str) -> Option<u64> {
    let digits = namespace.strip_prefix(UPLOAD_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Upload namespaces at least `days` old at `now_ms`; `days == 0` selects nothing.
pub fn expired_namespaces(names: &[String], now_ms: u64, days: u32) -> Vec<String> {
    if days == 0 {
        return Vec::new();
    }
    let max_age = u64::from(days) * MILLIS_PER_DAY;
    names
        .iter()
        .filter(|name| {
            parse_upload_timestamp(name)
                .is_some_and(|minted| now_ms.saturating_sub(minted) >= max_age)
        })
        .cloned()
        .collect()
}
