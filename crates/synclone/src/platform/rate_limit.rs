use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

use super::types::{Provider, RateLimitInfo};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Factor applied to the current rate on every rate-limit signal.
const SHRINK_FACTOR: f64 = 0.5;
/// Factor applied per cooldown window of sustained success.
const GROWTH_FACTOR: f64 = 1.25;
/// Default quiet period before the rate starts growing again.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
/// Longest pause honored when a platform reports an exhausted quota.
const MAX_QUOTA_PAUSE: Duration = Duration::from_secs(15 * 60);

/// Tunables for [`AdaptiveRateLimiter`].
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Starting and maximum rate, in requests per second.
    pub base_rps: f64,
    /// The rate never shrinks below this.
    pub min_rps: f64,
    /// Quiet period after a rate-limit signal before the rate grows.
    pub cooldown: Duration,
}

impl RateLimiterConfig {
    #[must_use]
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            base_rps: provider.default_rps(),
            min_rps: 0.1,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

struct LimiterState {
    limiter: Arc<GovernorRateLimiter>,
    current_rps: f64,
    /// Last shrink or growth step; growth waits a full cooldown after either.
    last_adjustment: Option<Instant>,
    paused_until: Option<Instant>,
}

/// Token-bucket limiter whose rate adapts to platform feedback.
///
/// Every rate-limit signal halves the effective rate (down to a floor).
/// After a cooldown window with no further signals, each success grows the
/// rate by a step until it is back at the configured base. A limiter is
/// scoped to one run target and shared by its discovery and worker tasks.
#[derive(Clone)]
pub struct AdaptiveRateLimiter {
    config: Arc<RateLimiterConfig>,
    state: Arc<Mutex<LimiterState>>,
    throttled: Arc<AtomicU64>,
}

fn build_limiter(rps: f64) -> Arc<GovernorRateLimiter> {
    let burst = NonZeroU32::new(rps.floor().max(1.0) as u32).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(Duration::from_secs_f64(1.0 / rps))
        .map(|q| q.allow_burst(burst))
        .unwrap_or_else(|| Quota::per_second(burst));
    Arc::new(RateLimiter::direct(quota))
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let base = config.base_rps.max(config.min_rps).max(f64::EPSILON);
        let config = RateLimiterConfig {
            base_rps: base,
            ..config
        };
        let state = LimiterState {
            limiter: build_limiter(base),
            current_rps: base,
            last_adjustment: None,
            paused_until: None,
        };
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
            throttled: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn for_provider(provider: Provider) -> Self {
        Self::new(RateLimiterConfig::for_provider(provider))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until the next request is allowed.
    pub async fn wait(&self) {
        let (limiter, paused_until) = {
            let state = self.lock();
            (Arc::clone(&state.limiter), state.paused_until)
        };
        if let Some(until) = paused_until
            && until > Instant::now()
        {
            tokio::time::sleep_until(until).await;
        }
        limiter.until_ready().await;
    }

    /// Record a rate-limit signal (HTTP 429 or a platform rate-limit error).
    pub fn on_rate_limited(&self, retry_after: Option<Duration>) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut state = self.lock();
        let next = (state.current_rps * SHRINK_FACTOR).max(self.config.min_rps);
        if next < state.current_rps {
            state.current_rps = next;
            state.limiter = build_limiter(next);
        }
        state.last_adjustment = Some(now);
        if let Some(wait) = retry_after {
            let until = now + wait.min(MAX_QUOTA_PAUSE);
            state.paused_until = Some(state.paused_until.map_or(until, |p| p.max(until)));
        }
        tracing::debug!(current_rps = state.current_rps, "Rate limiter shrunk");
    }

    /// Record a successful request or task.
    pub fn on_success(&self) {
        let now = Instant::now();
        let mut state = self.lock();
        if state.current_rps >= self.config.base_rps {
            return;
        }
        let quiet = state
            .last_adjustment
            .is_none_or(|last| now.duration_since(last) >= self.config.cooldown);
        if quiet {
            let next = (state.current_rps * GROWTH_FACTOR).min(self.config.base_rps);
            state.current_rps = next;
            state.limiter = build_limiter(next);
            state.last_adjustment = Some(now);
            tracing::debug!(current_rps = next, "Rate limiter grew");
        }
    }

    /// Feed quota headers from a platform response.
    ///
    /// An exhausted quota pauses all callers until the reported reset time.
    pub fn update(&self, info: &RateLimitInfo) {
        if let Some(wait) = info.retry_after {
            self.on_rate_limited(Some(wait));
            return;
        }
        if info.remaining > 0 {
            return;
        }
        let wait = (info.reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(MAX_QUOTA_PAUSE);
        if wait.is_zero() {
            return;
        }
        let until = Instant::now() + wait;
        let mut state = self.lock();
        state.paused_until = Some(state.paused_until.map_or(until, |p| p.max(until)));
        tracing::warn!(
            wait_secs = wait.as_secs(),
            "API quota exhausted, pausing until reset"
        );
    }

    /// The effective request rate.
    #[must_use]
    pub fn current_rps(&self) -> f64 {
        self.lock().current_rps
    }

    #[must_use]
    pub fn base_rps(&self) -> f64 {
        self.config.base_rps
    }

    /// Number of rate-limit signals observed.
    #[must_use]
    pub fn throttled_count(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter")
            .field("base_rps", &self.config.base_rps)
            .field("current_rps", &self.current_rps())
            .field("throttled", &self.throttled_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(base: f64) -> AdaptiveRateLimiter {
        AdaptiveRateLimiter::new(RateLimiterConfig {
            base_rps: base,
            min_rps: 0.5,
            cooldown: Duration::from_secs(10),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_rate_limits_strictly_decrease_rate() {
        let limiter = limiter(16.0);
        let mut previous = limiter.current_rps();
        for _ in 0..3 {
            limiter.on_rate_limited(None);
            let now = limiter.current_rps();
            assert!(now < previous, "{now} should be below {previous}");
            previous = now;
        }
        assert_eq!(limiter.throttled_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_never_drops_below_floor() {
        let limiter = limiter(2.0);
        for _ in 0..10 {
            limiter.on_rate_limited(None);
        }
        assert_eq!(limiter.current_rps(), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_grows_only_after_cooldown() {
        let limiter = limiter(16.0);
        limiter.on_rate_limited(None);
        limiter.on_rate_limited(None);
        let shrunk = limiter.current_rps();
        assert_eq!(shrunk, 4.0);

        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.on_success();
        assert_eq!(limiter.current_rps(), shrunk, "no growth inside cooldown");

        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.on_success();
        assert!(limiter.current_rps() > shrunk);

        // The next step needs another full window.
        let grown = limiter.current_rps();
        limiter.on_success();
        assert_eq!(limiter.current_rps(), grown);
    }

    #[tokio::test(start_paused = true)]
    async fn growth_is_capped_at_base() {
        let limiter = limiter(8.0);
        limiter.on_rate_limited(None);
        for _ in 0..20 {
            tokio::time::advance(Duration::from_secs(10)).await;
            limiter.on_success();
        }
        assert_eq!(limiter.current_rps(), 8.0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_at_base_is_a_no_op() {
        let limiter = limiter(8.0);
        limiter.on_success();
        assert_eq!(limiter.current_rps(), 8.0);
        assert_eq!(limiter.throttled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_pauses_wait() {
        let limiter = limiter(100.0);
        limiter.on_rate_limited(Some(Duration::from_secs(3)));
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_quota_pauses_without_shrinking() {
        let limiter = limiter(100.0);
        limiter.update(&RateLimitInfo {
            limit: 5000,
            remaining: 0,
            reset_at: Utc::now() + chrono::Duration::seconds(2),
            retry_after: None,
        });
        assert_eq!(limiter.current_rps(), 100.0);
        assert_eq!(limiter.throttled_count(), 0);

        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn provider_defaults() {
        let config = RateLimiterConfig::for_provider(Provider::GitHub);
        assert_eq!(config.base_rps, 10.0);
        assert_eq!(config.cooldown, DEFAULT_COOLDOWN);
    }
}
