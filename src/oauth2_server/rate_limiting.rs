// ABOUTME: OAuth2 endpoint rate limiting with RFC-style headers and rejection handling
// ABOUTME: Fixed-window limiter keyed per source IP and per client_id
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Xstar Mail

use crate::config::environment::RateLimitConfig;
use crate::constants::limits::RATE_LIMIT_CLEANUP_THRESHOLD;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a rate-limit bucket is keyed by
///
/// Token-endpoint brute forcing is bounded both per source IP and per
/// `client_id`, so a botnet cannot spread guesses across addresses and a
/// single address cannot spray across clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Source IP address
    Ip(IpAddr),
    /// OAuth client identifier
    Client(String),
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    /// Whether the request must be rejected
    pub is_limited: bool,
    /// Window limit for this endpoint
    pub limit: u32,
    /// Requests remaining in the current window
    pub remaining: u32,
    /// Seconds until the window resets
    pub retry_after_secs: u64,
}

/// `OAuth2` rate limiter with sharded concurrent per-key tracking
///
/// `DashMap` gives fine-grained locking instead of a global mutex, so checks
/// on unrelated keys never contend.
#[derive(Clone)]
pub struct OAuth2RateLimiter {
    /// Per-key request tracking: key -> (`request_count`, `window_start`)
    state: Arc<DashMap<RateLimitKey, (u32, Instant)>>,
    config: RateLimitConfig,
}

impl OAuth2RateLimiter {
    /// Create a rate limiter from configuration
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Check the per-IP and per-client budgets for the token endpoint
    ///
    /// Both buckets are charged; the stricter outcome wins.
    #[must_use]
    pub fn check_token_endpoint(&self, ip: IpAddr, client_id: &str) -> RateLimitStatus {
        let limit = self.config.token_requests_per_window;
        let by_ip = self.check(RateLimitKey::Ip(ip), limit);
        let by_client = self.check(RateLimitKey::Client(client_id.to_owned()), limit);

        if by_ip.is_limited {
            by_ip
        } else {
            by_client
        }
    }

    /// Check the per-IP budget for the authorize endpoint
    #[must_use]
    pub fn check_authorize_endpoint(&self, ip: IpAddr) -> RateLimitStatus {
        self.check(
            RateLimitKey::Ip(ip),
            self.config.authorize_requests_per_window,
        )
    }

    /// Check and charge one bucket
    fn check(&self, key: RateLimitKey, limit: u32) -> RateLimitStatus {
        let window = Duration::from_secs(self.config.window_seconds);

        if !self.config.enabled {
            return RateLimitStatus {
                is_limited: false,
                limit,
                remaining: limit,
                retry_after_secs: 0,
            };
        }

        let now = Instant::now();

        // Entry API gives an atomic read-modify-write without a full lock
        let mut entry = self.state.entry(key).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= window {
            *count = 0;
            *window_start = now;
        }

        let is_limited = *count >= limit;
        if !is_limited {
            *count += 1;
        }

        let remaining = limit.saturating_sub(*count);
        let elapsed = now.duration_since(*window_start);
        drop(entry);

        // Lazy cleanup off the critical path once the map grows
        if self.state.len() > RATE_LIMIT_CLEANUP_THRESHOLD {
            self.cleanup_stale_entries(now);
        }

        RateLimitStatus {
            is_limited,
            limit,
            remaining,
            retry_after_secs: window.saturating_sub(elapsed).as_secs().max(1),
        }
    }

    /// Remove entries whose window has long passed
    fn cleanup_stale_entries(&self, now: Instant) {
        let stale_after = Duration::from_secs(self.config.window_seconds * 2);
        self.state
            .retain(|_key, (_count, start)| now.duration_since(*start) < stale_after);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn limiter(limit: u32) -> OAuth2RateLimiter {
        OAuth2RateLimiter::new(RateLimitConfig {
            enabled: true,
            token_requests_per_window: limit,
            authorize_requests_per_window: limit,
            window_seconds: 60,
        })
    }

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));

    #[test]
    fn test_limit_enforced_per_ip() {
        let limiter = limiter(3);

        for _ in 0..3 {
            assert!(!limiter.check_authorize_endpoint(IP).is_limited);
        }

        let status = limiter.check_authorize_endpoint(IP);
        assert!(status.is_limited);
        assert_eq!(status.remaining, 0);
        assert!(status.retry_after_secs >= 1);
    }

    #[test]
    fn test_separate_ips_have_separate_budgets() {
        let limiter = limiter(1);
        let other = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9));

        assert!(!limiter.check_authorize_endpoint(IP).is_limited);
        assert!(limiter.check_authorize_endpoint(IP).is_limited);
        assert!(!limiter.check_authorize_endpoint(other).is_limited);
    }

    #[test]
    fn test_token_endpoint_charges_client_bucket() {
        let limiter = limiter(2);
        let other_ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10));

        // Same client from different IPs still exhausts the client bucket
        assert!(!limiter.check_token_endpoint(IP, "c1").is_limited);
        assert!(!limiter.check_token_endpoint(other_ip, "c1").is_limited);
        assert!(limiter
            .check_token_endpoint(
                IpAddr::V4(Ipv4Addr::new(203, 0, 113, 11)),
                "c1"
            )
            .is_limited);
    }

    #[test]
    fn test_disabled_limiter_never_limits() {
        let limiter = OAuth2RateLimiter::new(RateLimitConfig {
            enabled: false,
            token_requests_per_window: 1,
            authorize_requests_per_window: 1,
            window_seconds: 60,
        });

        for _ in 0..10 {
            assert!(!limiter.check_authorize_endpoint(IP).is_limited);
        }
    }
}
