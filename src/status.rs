// 🔀 Status Guard - A/I state machine shared by every catalog entity
//
// Transition input must be exactly "A" or "I". Moving to the current state is
// a no-op save: the audit stamp is still refreshed by the caller.

use crate::error::{CatalogError, CatalogResult};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "A")]
    Active,
    #[serde(rename = "I")]
    Inactive,
}

impl Status {
    /// Strict parse of external input
    pub fn parse(raw: &str) -> CatalogResult<Status> {
        match raw {
            "A" => Ok(Status::Active),
            "I" => Ok(Status::Inactive),
            other => Err(CatalogError::invalid(format!(
                "status must be 'A' or 'I', got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "A",
            Status::Inactive => "I",
        }
    }

    pub fn is_active(&self) -> bool {
        *self == Status::Active
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TRANSITION
// ============================================================================

/// Outcome of a validated transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Status,
    pub to: Status,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }

    pub fn is_activation(&self) -> bool {
        self.to == Status::Active && self.from != Status::Active
    }

    pub fn is_deactivation(&self) -> bool {
        self.to == Status::Inactive && self.from != Status::Inactive
    }
}

/// Entities that carry an A/I status
pub trait Stateful {
    fn status(&self) -> Status;
    fn set_status(&mut self, status: Status);
}

// ============================================================================
// STATUS GUARD
// ============================================================================

/// Validates a requested transition and applies it.
///
/// `on_activate` runs only when the entity actually moves to `A`;
/// `on_deactivate` only when it actually moves to `I`. Either hook can veto
/// the transition by returning an error, in which case the entity is untouched.
pub struct StatusGuard;

impl StatusGuard {
    pub fn plan(current: Status, requested: &str) -> CatalogResult<Transition> {
        let to = Status::parse(requested)?;
        Ok(Transition { from: current, to })
    }

    pub fn apply<E, A, D>(
        entity: &mut E,
        requested: &str,
        on_activate: A,
        on_deactivate: D,
    ) -> CatalogResult<Transition>
    where
        E: Stateful,
        A: FnOnce() -> CatalogResult<()>,
        D: FnOnce() -> CatalogResult<()>,
    {
        let transition = Self::plan(entity.status(), requested)?;

        if transition.is_activation() {
            on_activate()?;
        } else if transition.is_deactivation() {
            on_deactivate()?;
        }

        entity.set_status(transition.to);
        Ok(transition)
    }

    /// Transition with no entity-specific precondition
    pub fn apply_unconditional<E: Stateful>(
        entity: &mut E,
        requested: &str,
    ) -> CatalogResult<Transition> {
        Self::apply(entity, requested, || Ok(()), || Ok(()))
    }
}

/// No-op precondition hook
pub fn no_precondition() -> CatalogResult<()> {
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        status: Status,
    }

    impl Stateful for Dummy {
        fn status(&self) -> Status {
            self.status
        }
        fn set_status(&mut self, status: Status) {
            self.status = status;
        }
    }

    #[test]
    fn test_parse_is_strict() {
        assert_eq!(Status::parse("A").unwrap(), Status::Active);
        assert_eq!(Status::parse("I").unwrap(), Status::Inactive);
        assert!(Status::parse("a").is_err());
        assert!(Status::parse(" A").is_err());
        assert!(Status::parse("X").is_err());
        assert!(Status::parse("").is_err());
    }

    #[test]
    fn test_serde_uses_single_letters() {
        let json = serde_json::to_string(&Status::Active).unwrap();
        assert_eq!(json, "\"A\"");
        let back: Status = serde_json::from_str("\"I\"").unwrap();
        assert_eq!(back, Status::Inactive);
    }

    #[test]
    fn test_activation_hook_can_veto() {
        let mut entity = Dummy { status: Status::Inactive };
        let result = StatusGuard::apply(
            &mut entity,
            "A",
            || Err(CatalogError::ConflictRule("nope".into())),
            no_precondition,
        );

        assert!(result.is_err());
        assert_eq!(entity.status, Status::Inactive);
    }

    #[test]
    fn test_same_state_is_noop_without_hooks() {
        let mut entity = Dummy { status: Status::Active };
        let transition = StatusGuard::apply(
            &mut entity,
            "A",
            || panic!("activation hook must not run"),
            || panic!("deactivation hook must not run"),
        )
        .unwrap();

        assert!(transition.is_noop());
        assert_eq!(entity.status, Status::Active);
    }

    #[test]
    fn test_deactivation_runs_deactivate_hook_only() {
        let mut entity = Dummy { status: Status::Active };
        let mut ran = false;
        StatusGuard::apply(
            &mut entity,
            "I",
            || panic!("activation hook must not run"),
            || {
                ran = true;
                Ok(())
            },
        )
        .unwrap();

        assert!(ran);
        assert_eq!(entity.status, Status::Inactive);
    }

    #[test]
    fn test_invalid_token_leaves_entity_untouched() {
        let mut entity = Dummy { status: Status::Active };
        let err = StatusGuard::apply_unconditional(&mut entity, "Z").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidData);
        assert_eq!(entity.status, Status::Active);
    }
}
