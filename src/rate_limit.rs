//! How fast we may call a cloud OCR service.
//!
//! Cloud Vision quotas are stated per minute, but a whole book's worth of
//! pages arrives at once. We let an initial burst through, then spread the
//! rest out evenly instead of refilling in one lump.

use std::{fmt, str::FromStr, time::Duration};

use leaky_bucket::RateLimiter;

use crate::prelude::*;

/// The shortest gap we'll schedule between requests.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A request quota, written as `N/s` or `N/m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// The maximum number of requests allowed in the period.
    pub max_requests: u32,
    /// The period, which is either one second or one minute.
    pub per: Duration,
}

impl RateLimit {
    /// Create a [`RateLimiter`] that starts with a full period's worth of
    /// requests and then refills one request at a time.
    pub fn to_rate_limiter(&self) -> RateLimiter {
        let max = self.max_requests as usize;
        RateLimiter::builder()
            .initial(max)
            .max(max)
            .refill(1)
            .interval(self.request_interval())
            .build()
    }

    /// Average time between requests.
    pub fn request_interval(&self) -> Duration {
        (self.per / self.max_requests).max(MIN_INTERVAL)
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.per == Duration::from_secs(60) {
            "m"
        } else {
            "s"
        };
        write!(f, "{}/{}", self.max_requests, unit)
    }
}

impl FromStr for RateLimit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = || -> Result<Self> {
            let (count, unit) = s
                .split_once('/')
                .ok_or_else(|| anyhow!("expected N/s or N/m"))?;
            let max_requests = count.trim().parse::<u32>()?;
            if max_requests == 0 {
                return Err(anyhow!("must allow at least 1 request"));
            }
            let per = match unit.trim() {
                "s" => Duration::from_secs(1),
                "m" => Duration::from_secs(60),
                other => return Err(anyhow!("unsupported period {:?}", other)),
            };
            Ok(Self { max_requests, per })
        };
        parse().with_context(|| format!("Failed to parse rate limit: {:?}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_and_minutes() {
        let limit = "10/s".parse::<RateLimit>().unwrap();
        assert_eq!(limit.max_requests, 10);
        assert_eq!(limit.request_interval(), Duration::from_millis(100));
        assert_eq!(limit.to_string(), "10/s");

        let limit = "1800/m".parse::<RateLimit>().unwrap();
        assert_eq!(limit.per, Duration::from_secs(60));
        assert_eq!(limit.request_interval(), Duration::from_nanos(33_333_333));
        assert_eq!(limit.to_string(), "1800/m");
    }

    #[test]
    fn rejects_bad_limits() {
        for bad in ["10/h", "ten/s", "/s", "10", "0/s", "-1/m"] {
            assert!(bad.parse::<RateLimit>().is_err(), "{bad}");
        }
    }

    #[test]
    fn huge_limits_still_have_a_gap() {
        let limit = "4000000000/s".parse::<RateLimit>().unwrap();
        assert_eq!(limit.request_interval(), MIN_INTERVAL);
    }

    #[tokio::test]
    async fn limiter_allows_one_burst() {
        let limiter = "3/m".parse::<RateLimit>().unwrap().to_rate_limiter();
        for _ in 0..3 {
            assert!(limiter.try_acquire(1));
        }
        assert!(!limiter.try_acquire(1));
    }
}
