use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;
use tracing::warn;

use crate::infra::http::api::error::ApiError;

/// Service-wide sliding-window limiter shared by every route.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    admitted: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            admitted: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Records the request when a slot is free and returns the slots left.
    pub fn allow(&self) -> (bool, u32) {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().unwrap_or_else(|poisoned| {
            warn!(target = "taskdeck::http::rate_limit", "recovered poisoned limiter lock");
            PoisonError::into_inner(poisoned)
        });

        while admitted
            .front()
            .is_some_and(|instant| now.duration_since(*instant) >= self.window)
        {
            admitted.pop_front();
        }

        let used = u32::try_from(admitted.len()).unwrap_or(u32::MAX);
        let remaining = self.max_requests.saturating_sub(used);
        if remaining == 0 {
            return (false, 0);
        }

        admitted.push_back(now);
        (true, remaining - 1)
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }
}

pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (allowed, _) = limiter.allow();
    if allowed {
        return next.run(request).await;
    }

    let retry_after = limiter.retry_after_secs();
    let mut response = ApiError::rate_limited(retry_after).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn denies_once_the_window_is_full() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 3);

        assert_eq!(limiter.allow(), (true, 2));
        assert_eq!(limiter.allow(), (true, 1));
        assert_eq!(limiter.allow(), (true, 0));
        assert_eq!(limiter.allow(), (false, 0));
        assert_eq!(limiter.limit(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slots_free_up_as_the_window_slides() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 2);

        assert!(limiter.allow().0);
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(limiter.allow().0);
        assert!(!limiter.allow().0);

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(limiter.allow(), (true, 0));
        assert!(!limiter.allow().0);
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_one_window() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 1);
        let other = limiter.clone();

        assert!(limiter.allow().0);
        assert!(!other.allow().0);
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let limiter = RateLimiter::new(Duration::from_millis(250), 10);
        assert_eq!(limiter.retry_after_secs(), 1);

        let limiter = RateLimiter::new(Duration::from_secs(5), 10);
        assert_eq!(limiter.retry_after_secs(), 5);
    }
}
