//! Shortened URL aggregate.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::audit::{AuditInfo, Auditable};
use crate::domain::events::{
    DomainEvent, EventPayload, HasDomainEvents, ShortenedUrlCreated, ShortenedUrlRemoved,
};

/// A mapping from a short code to an original URL.
///
/// The code is assigned once at creation and never changes. Removal is
/// logical: the aggregate raises [`ShortenedUrlRemoved`] and the save marks
/// the row inactive.
#[derive(Debug, Clone)]
pub struct ShortenedUrl {
    pub id: Uuid,
    pub original_url: String,
    pub code: String,
    pub short_url: String,
    pub audit: AuditInfo,
    events: Vec<DomainEvent>,
}

impl ShortenedUrl {
    /// Creates a new aggregate and raises [`ShortenedUrlCreated`].
    pub fn create(original_url: String, code: String, short_url: String) -> Self {
        let mut url = Self {
            id: Uuid::new_v4(),
            original_url,
            code,
            short_url,
            audit: AuditInfo::new(Utc::now()),
            events: Vec::new(),
        };

        url.raise(EventPayload::ShortenedUrlCreated(ShortenedUrlCreated {
            shortened_url_id: url.id,
            code: url.code.clone(),
            original_url: url.original_url.clone(),
            short_url: url.short_url.clone(),
        }));

        url
    }

    /// Rebuilds an aggregate from storage, without pending events.
    pub fn restore(
        id: Uuid,
        original_url: String,
        code: String,
        short_url: String,
        created_on_utc: DateTime<Utc>,
        updated_on_utc: Option<DateTime<Utc>>,
        is_active: bool,
    ) -> Self {
        Self {
            id,
            original_url,
            code,
            short_url,
            audit: AuditInfo {
                created_on_utc,
                updated_on_utc,
                is_active,
            },
            events: Vec::new(),
        }
    }

    /// Marks the URL for removal and raises [`ShortenedUrlRemoved`].
    ///
    /// The caller persists it with [`crate::domain::audit::EntityState::Deleted`].
    pub fn remove(&mut self) {
        self.raise(EventPayload::ShortenedUrlRemoved(ShortenedUrlRemoved {
            shortened_url_id: self.id,
            code: self.code.clone(),
        }));
    }

    pub fn is_active(&self) -> bool {
        self.audit.is_active
    }

    fn raise(&mut self, payload: EventPayload) {
        self.events.push(DomainEvent::new(payload));
    }
}

impl HasDomainEvents for ShortenedUrl {
    fn domain_events(&self) -> &[DomainEvent] {
        &self.events
    }

    fn clear_domain_events(&mut self) {
        self.events.clear();
    }
}

impl Auditable for ShortenedUrl {
    fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}
