use std::str::FromStr;
use std::time::Duration;

/// What a run does after recording a failed recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecipientFailurePolicy {
    /// Stop the walk; the campaign stays in `sending`.
    #[default]
    Abort,
    /// Keep going; the campaign still finishes as `sent`.
    SkipAndContinue,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown recipient failure policy {0:?} (expected \"abort\" or \"skip\")")]
pub struct UnknownPolicy(pub String);

impl FromStr for RecipientFailurePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" | "skip-and-continue" => Ok(Self::SkipAndContinue),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// Redelivery of retryable trigger outcomes at the consumer boundary.
///
/// Delay before retry `n` (1-based) is `backoff_base * 2^(n - 1)`, capped at
/// `backoff_max`. With `max_attempts = 1` nothing is ever retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Delay to wait after `attempts_made` failed attempts, or `None` when
    /// the budget is spent.
    pub fn backoff_after(&self, attempts_made: u32) -> Option<Duration> {
        if attempts_made == 0 || attempts_made >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempts_made - 1);
        Some(self.backoff_base.saturating_mul(factor).min(self.backoff_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), None);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(10),
        };
        let delays: Vec<_> = (1..=6).map(|n| policy.backoff_after(n)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                Some(Duration::from_secs(8)),
                Some(Duration::from_secs(10)),
                Some(Duration::from_secs(10)),
                None,
            ]
        );
    }

    #[test]
    fn parses_failure_policy() {
        assert_eq!("abort".parse::<RecipientFailurePolicy>().unwrap(), RecipientFailurePolicy::Abort);
        assert_eq!(" Skip ".parse::<RecipientFailurePolicy>().unwrap(), RecipientFailurePolicy::SkipAndContinue);
        assert!("retry".parse::<RecipientFailurePolicy>().is_err());
    }
}
