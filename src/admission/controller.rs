use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::window::SlidingWindowCounter;
use crate::error::DeckgateError;

/// The endpoints guarded by admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyName {
    Auth,
    Translate,
    Upload,
    Api,
}

impl PolicyName {
    pub const ALL: [PolicyName; 4] = [
        PolicyName::Auth,
        PolicyName::Translate,
        PolicyName::Upload,
        PolicyName::Api,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyName::Auth => "auth",
            PolicyName::Translate => "translate",
            PolicyName::Upload => "upload",
            PolicyName::Api => "api",
        }
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth" => Ok(PolicyName::Auth),
            "translate" => Ok(PolicyName::Translate),
            "upload" => Ok(PolicyName::Upload),
            "api" => Ok(PolicyName::Api),
            other => Err(format!("unknown rate-limit policy: {other}")),
        }
    }
}

/// Immutable limits for one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub ceiling: u32,
    pub window: Duration,
    pub max_keys: usize,
}

/// Distinct keys each policy tracks before evicting.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

impl RateLimitPolicy {
    /// Built-in limits per policy.
    pub fn default_for(name: PolicyName) -> Self {
        let (ceiling, minutes) = match name {
            PolicyName::Auth => (10, 15),
            PolicyName::Translate => (20, 60),
            PolicyName::Upload => (30, 60),
            PolicyName::Api => (100, 15),
        };
        Self {
            ceiling,
            window: Duration::from_secs(minutes * 60),
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub policy: PolicyName,
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the oldest in-window occurrence expires.
    pub reset_at: DateTime<Utc>,
    /// Time until `reset_at`.
    pub retry_after: Duration,
}

impl Decision {
    /// Seconds to wait before retrying, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        }
    }

    /// Turn a denial into [`DeckgateError::RateLimited`].
    pub fn into_result(self) -> Result<Decision, DeckgateError> {
        if self.allowed {
            return Ok(self);
        }
        Err(DeckgateError::RateLimited {
            policy: self.policy,
            limit: self.limit,
            remaining: self.remaining,
            reset_at: self.reset_at,
            retry_after_secs: self.retry_after_secs(),
        })
    }

    /// Body of a "429 Too Many Requests" response.
    pub fn too_many_requests(&self) -> TooManyRequests {
        TooManyRequests {
            error: "Too many requests, please try again later.".to_string(),
            policy: self.policy,
            limit: self.limit,
            remaining: self.remaining,
            reset: self.reset_at.timestamp(),
            retry_after: self.retry_after_secs(),
        }
    }
}

/// JSON body for a rate-limit denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TooManyRequests {
    pub error: String,
    pub policy: PolicyName,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp in seconds.
    pub reset: i64,
    /// Seconds.
    pub retry_after: u64,
}

impl TooManyRequests {
    pub const STATUS: u16 = 429;

    /// Standard rate-limit response headers.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("RateLimit-Limit", self.limit.to_string()),
            ("RateLimit-Remaining", self.remaining.to_string()),
            ("RateLimit-Reset", self.retry_after.to_string()),
            ("Retry-After", self.retry_after.to_string()),
        ]
    }
}

/// Per-client admission control across all policies.
///
/// One [`SlidingWindowCounter`] per policy, created on first use. Rejected
/// attempts still consume a slot so a client hammering a limit keeps being
/// refused until it backs off for a full window.
#[derive(Debug)]
pub struct AdmissionController {
    policies: HashMap<PolicyName, RateLimitPolicy>,
    counters: DashMap<PolicyName, Arc<SlidingWindowCounter>>,
    disabled: bool,
}

impl AdmissionController {
    pub fn new(policies: HashMap<PolicyName, RateLimitPolicy>) -> Self {
        Self {
            policies,
            counters: DashMap::new(),
            disabled: false,
        }
    }

    /// Controller using the built-in limits.
    pub fn with_defaults() -> Self {
        let policies = PolicyName::ALL
            .into_iter()
            .map(|name| (name, RateLimitPolicy::default_for(name)))
            .collect();
        Self::new(policies)
    }

    /// Turn every check into an unconditional allow. Protection is fully off,
    /// so this is logged when set and on every bypassed call.
    pub fn disabled(mut self, disabled: bool) -> Self {
        if disabled {
            warn!("rate limiting is DISABLED: every request will be admitted");
        }
        self.disabled = disabled;
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn policy(&self, name: PolicyName) -> RateLimitPolicy {
        self.policies
            .get(&name)
            .copied()
            .unwrap_or_else(|| RateLimitPolicy::default_for(name))
    }

    fn counter(&self, name: PolicyName) -> Arc<SlidingWindowCounter> {
        if let Some(counter) = self.counters.get(&name) {
            return Arc::clone(&counter);
        }
        let policy = self.policy(name);
        self.counters
            .entry(name)
            .or_insert_with(|| Arc::new(SlidingWindowCounter::new(policy.window, policy.max_keys)))
            .clone()
    }

    /// Record an attempt by `client_key` against `policy` and decide.
    ///
    /// `limit` overrides the policy ceiling for this call.
    pub fn admit(&self, policy: PolicyName, client_key: &str, limit: Option<u32>) -> Decision {
        let config = self.policy(policy);
        let ceiling = limit.unwrap_or(config.ceiling);

        if self.disabled {
            warn!(%policy, client_key, "rate limiting bypassed");
            return Decision {
                policy,
                allowed: true,
                limit: ceiling,
                remaining: ceiling,
                reset_at: Utc::now(),
                retry_after: Duration::ZERO,
            };
        }

        let counter = self.counter(policy);
        let recorded = counter.record(client_key);
        let count = u32::try_from(recorded.count).unwrap_or(u32::MAX);

        // Windows too large for the clock saturate instead of overflowing.
        let retry_after = match recorded.oldest.checked_add(counter.window()) {
            Some(reset) => reset.saturating_duration_since(Instant::now()),
            None => counter.window(),
        };
        let reset_at = chrono::Duration::from_std(retry_after)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let allowed = count <= ceiling;
        if !allowed {
            debug!(%policy, client_key, count, ceiling, "request rate limited");
        }

        Decision {
            policy,
            allowed,
            limit: ceiling,
            remaining: ceiling.saturating_sub(count),
            reset_at,
            retry_after,
        }
    }

    /// Drop keys whose window has fully elapsed, across all policies.
    pub fn purge_expired(&self) -> usize {
        self.counters
            .iter()
            .map(|entry| entry.value().purge_expired())
            .sum()
    }

    pub fn tracked_keys(&self, policy: PolicyName) -> usize {
        self.counters
            .get(&policy)
            .map(|counter| counter.tracked_keys())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_policy(name: PolicyName, ceiling: u32, window: Duration) -> AdmissionController {
        capped_policy(name, ceiling, window, 100)
    }

    fn capped_policy(
        name: PolicyName,
        ceiling: u32,
        window: Duration,
        max_keys: usize,
    ) -> AdmissionController {
        let mut policies = HashMap::new();
        policies.insert(
            name,
            RateLimitPolicy {
                ceiling,
                window,
                max_keys,
            },
        );
        AdmissionController::new(policies)
    }

    /// Each task admits its own key, then the shared `"victim"` key.
    /// Returns how many victim calls were allowed.
    async fn admit_noise_then_victim(controller: &Arc<AdmissionController>, tasks: usize) -> usize {
        let handles: Vec<_> = (0..tasks)
            .map(|i| {
                let controller = Arc::clone(controller);
                tokio::spawn(async move {
                    controller.admit(PolicyName::Api, &format!("noise-{i}"), None);
                    controller.admit(PolicyName::Api, "victim", None).allowed
                })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        allowed
    }

    #[tokio::test(start_paused = true)]
    async fn auth_scenario_eleventh_call_denied() {
        let controller = AdmissionController::with_defaults();
        let started = Utc::now();

        for i in 1..=10 {
            let decision = controller.admit(PolicyName::Auth, "1.2.3.4", None);
            assert!(decision.allowed, "call {i} should be allowed");
            assert_eq!(decision.remaining, 10 - i);
        }

        let denied = controller.admit(PolicyName::Auth, "1.2.3.4", None);
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 10);
        assert_eq!(denied.remaining, 0);
        let until_reset = denied.reset_at - started;
        assert!((until_reset.num_seconds() - 15 * 60).abs() <= 2);
        assert_eq!(denied.retry_after, Duration::from_secs(15 * 60));
        assert_eq!(denied.retry_after_secs(), 900);
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_keys_do_not_interfere() {
        let controller = single_policy(PolicyName::Api, 3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(controller.admit(PolicyName::Api, "a", None).allowed);
            assert!(controller.admit(PolicyName::Api, "b", None).allowed);
        }
        assert!(!controller.admit(PolicyName::Api, "a", None).allowed);
        assert!(!controller.admit(PolicyName::Api, "b", None).allowed);
        assert!(controller.admit(PolicyName::Api, "c", None).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn policies_are_independent() {
        let controller = AdmissionController::with_defaults();
        for _ in 0..11 {
            controller.admit(PolicyName::Auth, "k", None);
        }
        assert!(!controller.admit(PolicyName::Auth, "k", None).allowed);
        assert!(controller.admit(PolicyName::Upload, "k", None).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn window_drains_after_elapsing() {
        let controller = single_policy(PolicyName::Translate, 2, Duration::from_secs(60));
        controller.admit(PolicyName::Translate, "k", None);
        controller.admit(PolicyName::Translate, "k", None);
        assert!(!controller.admit(PolicyName::Translate, "k", None).allowed);

        tokio::time::advance(Duration::from_secs(61)).await;
        let decision = controller.admit(PolicyName::Translate, "k", None);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_attempts_consume_slots() {
        let controller = single_policy(PolicyName::Api, 1, Duration::from_secs(60));
        assert!(controller.admit(PolicyName::Api, "k", None).allowed);

        tokio::time::advance(Duration::from_secs(40)).await;
        // Denied, but still recorded.
        assert!(!controller.admit(PolicyName::Api, "k", None).allowed);

        // The first hit has expired; the rejected one has not.
        tokio::time::advance(Duration::from_secs(30)).await;
        let decision = controller.admit(PolicyName::Api, "k", None);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn limit_override_replaces_ceiling() {
        let controller = AdmissionController::with_defaults();
        assert!(controller.admit(PolicyName::Api, "k", Some(1)).allowed);
        let denied = controller.admit(PolicyName::Api, "k", Some(1));
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_controller_admits_without_recording() {
        let controller = single_policy(PolicyName::Auth, 1, Duration::from_secs(60)).disabled(true);
        for _ in 0..5 {
            assert!(controller.admit(PolicyName::Auth, "k", None).allowed);
        }
        assert_eq!(controller.tracked_keys(PolicyName::Auth), 0);
        assert!(controller.is_disabled());
    }

    #[tokio::test(start_paused = true)]
    async fn denial_maps_to_rate_limited_error() {
        let controller = single_policy(PolicyName::Upload, 1, Duration::from_secs(10));
        assert!(controller.admit(PolicyName::Upload, "k", None).into_result().is_ok());

        let err = controller
            .admit(PolicyName::Upload, "k", None)
            .into_result()
            .unwrap_err();
        match err {
            DeckgateError::RateLimited {
                policy,
                limit,
                remaining,
                retry_after_secs,
                ..
            } => {
                assert_eq!(policy, PolicyName::Upload);
                assert_eq!(limit, 1);
                assert_eq!(remaining, 0);
                assert_eq!(retry_after_secs, 10);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_requests_body_and_headers() {
        let controller = single_policy(PolicyName::Auth, 1, Duration::from_secs(90));
        controller.admit(PolicyName::Auth, "k", None);
        let body = controller.admit(PolicyName::Auth, "k", None).too_many_requests();

        assert_eq!(body.retry_after, 90);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["policy"], "auth");
        assert_eq!(json["limit"], 1);
        assert_eq!(json["remaining"], 0);
        assert!(json["reset"].is_i64());

        let headers = body.headers();
        assert!(headers.contains(&("Retry-After", "90".to_string())));
        assert!(headers.contains(&("RateLimit-Remaining", "0".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_window_saturates_instead_of_panicking() {
        let controller = single_policy(PolicyName::Api, 1, Duration::from_secs(u64::MAX));
        assert!(controller.admit(PolicyName::Api, "k", None).allowed);

        let denied = controller.admit(PolicyName::Api, "k", None);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(u64::MAX));
        assert_eq!(denied.retry_after_secs(), u64::MAX);
        assert_eq!(denied.reset_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(controller.purge_expired(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admits_allow_exactly_the_ceiling() {
        let controller = Arc::new(capped_policy(
            PolicyName::Api,
            10,
            Duration::from_secs(600),
            1024,
        ));
        assert_eq!(admit_noise_then_victim(&controller, 200).await, 10);
        assert_eq!(controller.tracked_keys(PolicyName::Api), 201);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admits_under_key_pressure_stay_bounded() {
        let controller = Arc::new(capped_policy(PolicyName::Api, 10, Duration::from_secs(600), 4));
        let allowed = admit_noise_then_victim(&controller, 200).await;

        // Eviction only ever forgets history, so the ceiling is a floor here.
        assert!(allowed >= 10, "victim allowed {allowed} times");
        assert!(controller.tracked_keys(PolicyName::Api) <= 4);
    }

    #[test]
    fn policy_name_parsing() {
        assert_eq!("auth".parse::<PolicyName>().unwrap(), PolicyName::Auth);
        assert_eq!(" Upload ".parse::<PolicyName>().unwrap(), PolicyName::Upload);
        assert!("admin".parse::<PolicyName>().is_err());
        assert_eq!(PolicyName::Translate.to_string(), "translate");
    }

    #[test]
    fn default_policies() {
        let auth = RateLimitPolicy::default_for(PolicyName::Auth);
        assert_eq!(auth.ceiling, 10);
        assert_eq!(auth.window, Duration::from_secs(900));
        assert_eq!(auth.max_keys, DEFAULT_MAX_KEYS);
    }
}
