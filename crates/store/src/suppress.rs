//! The suppressed-error channel for cleanup failures.
//!
//! Two operations in this crate swallow failures on purpose: releasing a
//! lease after a write/delete, and the opportunistic delete of an expired
//! item found during a read. Neither may alter the primary result of the
//! operation that triggered it. Instead of an empty catch, every swallowed
//! error is routed through a [`SuppressedErrorHook`] so operators can
//! observe them without changing the return contract.

use crate::error::BlobError;

/// Observer for errors that are deliberately swallowed during cleanup.
///
/// Implementations must not panic; a panicking hook would defeat the
/// guarantee that cleanup failures never mask a primary outcome.
pub trait SuppressedErrorHook: Send + Sync {
    /// Called once per swallowed error.
    ///
    /// `operation` names the cleanup step (`"lease-release"` or
    /// `"expired-delete"`), `location` is the affected storage location.
    fn on_suppressed(&self, operation: &str, location: &str, error: &BlobError);
}

/// Default hook: records the failure at `warn` level and drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSuppressed;

impl SuppressedErrorHook for LogSuppressed {
    fn on_suppressed(&self, operation: &str, location: &str, error: &BlobError) {
        tracing::warn!(operation, location, error = %error, "suppressed cleanup failure");
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Hook that records every suppressed error, for assertions.
    #[derive(Default)]
    struct Recording(Mutex<Vec<(String, String)>>);

    impl SuppressedErrorHook for Recording {
        fn on_suppressed(&self, operation: &str, location: &str, _error: &BlobError) {
            self.0.lock().expect("lock").push((operation.to_string(), location.to_string()));
        }
    }

    #[test]
    fn hook_receives_operation_and_location() {
        let hook = Recording::default();
        hook.on_suppressed("lease-release", "tenants/alpha/config", &BlobError::timeout());

        let seen = hook.0.lock().expect("lock");
        assert_eq!(seen.as_slice(), &[("lease-release".into(), "tenants/alpha/config".into())]);
    }
}
