//! Audit fields and the soft-delete policy applied on every save.

use chrono::{DateTime, Utc};

/// How an entity is being written in the current save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Added,
    Modified,
    /// Logical delete: the row is kept and flagged inactive.
    Deleted,
}

/// Creation/modification timestamps and the active-row flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditInfo {
    pub created_on_utc: DateTime<Utc>,
    pub updated_on_utc: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl AuditInfo {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_on_utc: now,
            updated_on_utc: None,
            is_active: true,
        }
    }

    pub fn apply(&mut self, state: EntityState, now: DateTime<Utc>) {
        match state {
            EntityState::Added => {
                self.created_on_utc = now;
                self.is_active = true;
            }
            EntityState::Modified => {
                self.updated_on_utc = Some(now);
            }
            EntityState::Deleted => {
                self.is_active = false;
                self.updated_on_utc = Some(now);
            }
        }
    }
}

/// Entities carrying [`AuditInfo`].
pub trait Auditable {
    fn audit(&self) -> &AuditInfo;

    fn audit_mut(&mut self) -> &mut AuditInfo;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_added_sets_created_and_active() {
        let earlier = Utc::now() - Duration::hours(1);
        let now = Utc::now();
        let mut audit = AuditInfo::new(earlier);
        audit.is_active = false;

        audit.apply(EntityState::Added, now);

        assert_eq!(audit.created_on_utc, now);
        assert!(audit.is_active);
        assert!(audit.updated_on_utc.is_none());
    }

    #[test]
    fn test_modified_sets_updated_only() {
        let created = Utc::now() - Duration::hours(1);
        let now = Utc::now();
        let mut audit = AuditInfo::new(created);

        audit.apply(EntityState::Modified, now);

        assert_eq!(audit.created_on_utc, created);
        assert_eq!(audit.updated_on_utc, Some(now));
        assert!(audit.is_active);
    }

    #[test]
    fn test_deleted_is_soft() {
        let now = Utc::now();
        let mut audit = AuditInfo::new(now);

        audit.apply(EntityState::Deleted, now);

        assert!(!audit.is_active);
        assert_eq!(audit.updated_on_utc, Some(now));
    }
}
