//! Bounded retry with exponential backoff.

use super::{DeliveryError, MailSender, SendMailRequest};
use std::time::Duration;
use tracing::warn;

/// How many times a send is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base...
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Sends through `sender`, retrying transient rejections.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or
    /// [`DeliveryError::Exhausted`] once every attempt failed transiently.
    pub async fn send<M: MailSender>(
        &self,
        sender: &M,
        mailbox: &str,
        request: &SendMailRequest,
    ) -> Result<(), DeliveryError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match sender.send_mail(mailbox, request).await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(DeliveryError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(mailbox, attempt, ?delay, error = %e, "Transient delivery failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
