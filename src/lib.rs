//! Admission control and live job progress for a slide-deck translation
//! service.
//!
//! The core is transport-agnostic: a web layer calls [`services::Deckgate`]
//! to admit requests and start jobs, then forwards
//! [`progress::Subscription`] events to its clients.

pub mod admission;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod services;
pub mod state_machine;

pub use error::{DeckgateError, FailureKind, Result};
pub use services::{Deckgate, HousekeepingReport};
