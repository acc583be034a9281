//! Shared state of the worker's HTTP surface.

use std::sync::Arc;

use crate::domain::repositories::OutboxRepository;
use crate::infrastructure::cache::CacheService;
use crate::jobs::DispatcherStatus;

#[derive(Clone)]
pub struct AppState {
    pub outbox: Arc<dyn OutboxRepository>,
    pub cache: Arc<dyn CacheService>,
    pub dispatcher_status: Arc<DispatcherStatus>,
}

impl AppState {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        cache: Arc<dyn CacheService>,
        dispatcher_status: Arc<DispatcherStatus>,
    ) -> Self {
        Self {
            outbox,
            cache,
            dispatcher_status,
        }
    }
}
