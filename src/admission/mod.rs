//! Per-client request-rate admission control.

mod controller;
mod window;

pub use controller::{
    AdmissionController, DEFAULT_MAX_KEYS, Decision, PolicyName, RateLimitPolicy, TooManyRequests,
};
pub use window::{SlidingWindowCounter, WindowCount};
