//! Pre-commit pass shared by every aggregate save.
//!
//! Two hooks run over the same commit point:
//!
//! 1. **Audit**: stamps creation/update times and applies the soft-delete policy.
//! 2. **Outbox capture**: turns every pending domain event into an
//!    [`OutboxMessage`] with the event's own id.
//!
//! Repositories call [`prepare_save`] before or inside their transaction,
//! write the prepared audit fields and messages with the aggregate, commit,
//! and only then call [`finish_save`]. A rolled-back save leaves the
//! aggregate exactly as it was.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::audit::{AuditInfo, Auditable, EntityState};
use crate::domain::entities::OutboxMessage;
use crate::domain::events::HasDomainEvents;
use crate::error::AppError;

/// Row values for one save, not yet applied to the aggregate.
#[derive(Debug)]
pub struct PreparedSave {
    pub audit: AuditInfo,
    pub messages: Vec<OutboxMessage>,
}

/// Returns the entity's audit fields as they will be after a save in `state` at `now`.
pub fn stamp_audit<E: Auditable + ?Sized>(
    entity: &E,
    state: EntityState,
    now: DateTime<Utc>,
) -> AuditInfo {
    let mut audit = entity.audit().clone();
    audit.apply(state, now);
    audit
}

/// Serializes the aggregate's pending events into outbox messages.
///
/// The event buffer is left untouched.
///
/// # Errors
///
/// Returns [`AppError::Internal`] if an event cannot be serialized.
pub fn capture_events<A: HasDomainEvents + ?Sized>(
    aggregate: &A,
) -> Result<Vec<OutboxMessage>, AppError> {
    aggregate
        .domain_events()
        .iter()
        .map(|event| {
            OutboxMessage::from_event(event).map_err(|e| {
                AppError::internal(
                    "Failed to serialize domain event",
                    json!({ "event_id": event.id, "event_type": event.event_type(), "reason": e.to_string() }),
                )
            })
        })
        .collect()
}

/// Runs both hooks without touching the aggregate.
pub fn prepare_save<A>(
    aggregate: &A,
    state: EntityState,
    now: DateTime<Utc>,
) -> Result<PreparedSave, AppError>
where
    A: Auditable + HasDomainEvents,
{
    Ok(PreparedSave {
        audit: stamp_audit(aggregate, state, now),
        messages: capture_events(aggregate)?,
    })
}

/// Applies the committed audit fields and drains the event buffer.
pub fn finish_save<A>(aggregate: &mut A, audit: AuditInfo)
where
    A: Auditable + HasDomainEvents,
{
    *aggregate.audit_mut() = audit;
    aggregate.clear_domain_events();
}
