// 📜 Audit - Who changed what, and when
//
// Every entity carries an Audit stamp; every mutation also appends an Event
// to the audit trail ("every change is an event").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// AUDIT STAMP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    /// Set once on creation, never overwritten
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Audit {
    pub fn new(actor: &str) -> Self {
        let now = Utc::now();
        Audit {
            created_at: now,
            updated_at: now,
            updated_by: actor.to_string(),
        }
    }

    /// Refresh the update fields; created_at is preserved
    pub fn touch(&mut self, actor: &str) {
        self.updated_at = Utc::now();
        self.updated_by = actor.to_string();
    }
}

/// Entities carrying an audit stamp
pub trait Audited {
    fn audit(&self) -> &Audit;
    fn audit_mut(&mut self) -> &mut Audit;

    fn touch(&mut self, actor: &str) {
        self.audit_mut().touch(actor);
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_preserves_created_at() {
        let mut audit = Audit::new("alice");
        let created = audit.created_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        audit.touch("bob");

        assert_eq!(audit.created_at, created);
        assert!(audit.updated_at > created);
        assert_eq!(audit.updated_by, "bob");
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = Event::new("created", "bin", "123456", serde_json::json!({}), "alice");
        let b = Event::new("created", "bin", "123456", serde_json::json!({}), "alice");
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.actor, "alice");
    }
}
