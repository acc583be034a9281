#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use shortly::application::events::default_event_bus;
use shortly::application::outbox::{DispatcherSettings, OutboxDispatcher};
use shortly::application::services::{ShortenUrl, ShortenedUrlService};
use shortly::infrastructure::cache::MemoryCache;
use shortly::infrastructure::persistence::InMemoryDatabase;
use shortly::utils::code_generator::CodeSettings;

/// Shortening service, dispatcher and cache over one in-memory database.
pub struct TestStack {
    pub db: InMemoryDatabase,
    pub cache: Arc<MemoryCache>,
    pub service: Arc<ShortenedUrlService<InMemoryDatabase>>,
    pub dispatcher: OutboxDispatcher<InMemoryDatabase>,
}

pub fn stack() -> TestStack {
    stack_with_codes(CodeSettings::default())
}

/// Same stack with a custom code space.
pub fn stack_with_codes(codes: CodeSettings) -> TestStack {
    let db = InMemoryDatabase::new();
    let cache = Arc::new(MemoryCache::new(300));

    let service = ShortenedUrlService::new(Arc::new(db.clone()), codes, cache.clone());

    let bus = default_event_bus(Arc::new(db.clone()), cache.clone()).unwrap();
    let dispatcher = OutboxDispatcher::new(
        Arc::new(db.clone()),
        Arc::new(bus),
        DispatcherSettings {
            retry_step: Duration::ZERO,
            ..DispatcherSettings::default()
        },
    );

    TestStack {
        db,
        cache,
        service: Arc::new(service),
        dispatcher,
    }
}

pub fn shorten(url: &str) -> ShortenUrl {
    ShortenUrl {
        original_url: url.to_string(),
        scheme: "https".to_string(),
        host: "short.ly".to_string(),
    }
}
