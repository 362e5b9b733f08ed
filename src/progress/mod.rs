mod broadcaster;

pub use broadcaster::{
    DEFAULT_MAX_TOPICS, DEFAULT_SUBSCRIBER_BUFFER, ProgressBroadcaster, Subscription,
};
