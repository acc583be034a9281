//! Outbox dispatching.

mod dispatcher;

pub use dispatcher::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_STEP, DispatchReport,
    DispatcherSettings, OutboxDispatcher, retry_delays,
};
