//! HTTP client with rate limiting for the Spotify Web API.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting so the poll cadence and the request/response
//!   endpoints together stay within the remote API quota
//! * A consistent timeout and `User-Agent` on every request
//!
//! Requests that would exceed the rate limit are delayed, not rejected.

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// The underlying client, used to build requests.
    ///
    /// Executing through it directly bypasses rate limiting; pass built
    /// requests to [`Client::execute`] instead.
    pub unlimited: reqwest::Client,

    /// Rate limiter for API quota compliance.
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window over which calls are counted.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Maximum calls allowed within each window.
    ///
    /// The 1-second poll cadence uses a fraction of this; the headroom
    /// covers artwork fetches and recently-played requests.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// Duration to keep idle connections alive.
    ///
    /// Prevents reconnection overhead between poll ticks.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Limit on any single outbound request, start to finish.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client from the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(&config.user_agent);

        // Rate limit own requests as to not hammer the remote API.
        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Executes a request after waiting for rate limit clearance.
    ///
    /// # Errors
    ///
    /// Returns error if request execution fails or a network error occurs.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No need to await with jitter because the level of concurrency is low.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
