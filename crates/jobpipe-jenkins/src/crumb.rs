//! Process-wide CSRF crumb cache.
//!
//! One token, one lock. The lock is held across check, fetch, and store, so a burst of
//! mutating calls after expiry produces exactly one refresh and every waiter sees the
//! stored result.

use jobpipe_core::{RequestContext, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const CRUMB_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
struct Crumb {
    value: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct CrumbCache {
    slot: Mutex<Option<Crumb>>,
    ttl: Duration,
}

impl Default for CrumbCache {
    fn default() -> Self {
        Self::with_ttl(CRUMB_TTL)
    }
}

impl CrumbCache {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    /// Return the cached crumb if `now` is before its expiry, otherwise run `fetch` once
    /// and cache its result.
    ///
    /// A failed fetch is logged and yields `None`; nothing is cached, so the next call
    /// tries again.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        ctx: &RequestContext,
        now: Instant,
        fetch: F,
    ) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(c) = slot.as_ref() {
            if now < c.expires_at {
                return Some(c.value.clone());
            }
        }

        match fetch().await {
            Ok(value) => {
                tracing::debug!(request_id = %ctx.request_id(), "crumb refreshed");
                *slot = Some(Crumb {
                    value: value.clone(),
                    expires_at: now + self.ttl,
                });
                Some(value)
            }
            Err(e) => {
                *slot = None;
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    error = %e,
                    "crumb refresh failed; sending request without CSRF header"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobpipe_core::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<String>> + Send>> {
        let calls = Arc::clone(calls);
        move || {
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(format!("crumb-{n}"))
            })
        }
    }

    #[tokio::test]
    async fn valid_crumb_is_reused_for_the_whole_window() {
        let cache = CrumbCache::default();
        let ctx = RequestContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();

        let a = cache.get_or_refresh(&ctx, t0, counting_fetch(&calls)).await;
        let b = cache
            .get_or_refresh(&ctx, t0 + Duration::from_secs(29 * 60), counting_fetch(&calls))
            .await;
        assert_eq!(a.as_deref(), Some("crumb-1"));
        assert_eq!(b, a);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let c = cache
            .get_or_refresh(&ctx, t0 + CRUMB_TTL, counting_fetch(&calls))
            .await;
        assert_eq!(c.as_deref(), Some("crumb-2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_refresh_once() {
        let cache = Arc::new(CrumbCache::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let fetch = counting_fetch(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(&RequestContext::new(), now, fetch)
                    .await
            }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap().as_deref(), Some("crumb-1"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_is_not_cached() {
        let cache = CrumbCache::default();
        let ctx = RequestContext::new();
        let now = Instant::now();

        let none = cache
            .get_or_refresh(&ctx, now, || async {
                Err(Error::Auth("crumb issuer HTTP 404".to_string()))
            })
            .await;
        assert_eq!(none, None);

        let calls = Arc::new(AtomicUsize::new(0));
        let retry = cache.get_or_refresh(&ctx, now, counting_fetch(&calls)).await;
        assert_eq!(retry.as_deref(), Some("crumb-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
