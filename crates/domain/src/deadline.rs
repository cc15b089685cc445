//! Caller-supplied deadlines.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::DomainError;

/// The point in time by which an operation must finish.
///
/// Every service call takes one. When it passes, the in-flight future is
/// dropped, which also drops (and so rolls back) any open unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { at: None }
    }

    /// A deadline at a fixed instant.
    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// Returns the time left, or None if unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Returns true if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| at <= Instant::now())
    }

    /// Runs `future`, failing with [`DomainError::Timeout`] if the deadline
    /// passes first.
    pub async fn run<F, T>(self, operation: &'static str, future: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        match self.at {
            Some(at) => tokio::time::timeout_at(at, future)
                .await
                .map_err(|_| DomainError::Timeout { operation })?,
            None => future.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn unbounded_deadline_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert!(deadline.remaining().is_none());
    }

    #[tokio::test]
    async fn run_completes_within_deadline() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let result = deadline.run("test", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn run_times_out() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result: Result<(), DomainError> = deadline
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("slow"));
    }

    #[tokio::test]
    async fn expired_deadline_reports_zero_remaining() {
        let deadline = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }
}
