//! Shared provider traits for dependency injection.
//!
//! The conversation window is time based, so the clock is abstracted behind a
//! trait and injected wherever "now" matters.

use chrono::{DateTime, Utc};

/// Trait for providing timestamps.
///
/// # Example
///
/// ```
/// use howto::providers::{TimeProvider, SystemTimeProvider};
///
/// let provider = SystemTimeProvider;
/// let now = provider.now();
/// assert!(now.timestamp() > 0);
/// ```
pub trait TimeProvider: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Default time provider using the system clock.
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time provider frozen at a given instant.
pub struct FixedTimeProvider(pub DateTime<Utc>);

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
