// ⚠️ Catalog Errors - Typed failures for every engine operation
//
// Every failure is scoped to a single operation. The kind() taxonomy is what
// callers (HTTP, CLI) use to decide how to render a failure.

use serde::Serialize;
use thiserror::Error;

/// Result alias used across the engine and the store ports
pub type CatalogResult<T> = Result<T, CatalogError>;

// ============================================================================
// ERROR KIND (taxonomy)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidData,
    ConflictRule,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::InvalidData => "INVALID_DATA",
            ErrorKind::ConflictRule => "CONFLICT_RULE",
            ErrorKind::Storage => "STORAGE",
        }
    }
}

// ============================================================================
// CATALOG ERROR
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("BIN {0} not found")]
    BinNotFound(String),

    #[error("subtype {0} not found")]
    SubtypeNotFound(String),

    #[error("agency {agency_code} not found under subtype {subtype_code}")]
    AgencyNotFound {
        subtype_code: String,
        agency_code: String,
    },

    #[error("commerce plan {0} not found")]
    PlanNotFound(String),

    #[error("plan item {0} not found")]
    PlanItemNotFound(i64),

    #[error("validation {0} not found")]
    ValidationNotFound(String),

    #[error("validation {validation_code} is not mapped to subtype {subtype_code} / BIN {bin}")]
    MapNotFound {
        subtype_code: String,
        bin: String,
        validation_code: String,
    },

    #[error("BIN {0} already exists")]
    BinAlreadyExists(String),

    #[error("subtype already exists: {0}")]
    SubtypeAlreadyExists(String),

    #[error("agency {agency_code} already exists under subtype {subtype_code}")]
    AgencyAlreadyExists {
        subtype_code: String,
        agency_code: String,
    },

    #[error("commerce plan {0} already exists")]
    PlanAlreadyExists(String),

    #[error("validation {0} already exists")]
    ValidationAlreadyExists(String),

    #[error("validation {validation_code} is already mapped to subtype {subtype_code} / BIN {bin}")]
    AlreadyExists {
        subtype_code: String,
        bin: String,
        validation_code: String,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("subtype {0} cannot be activated without an active agency")]
    ActivateRequiresAgency(String),

    #[error("rule conflict: {0}")]
    ConflictRule(String),

    #[error("plan assignment conflict: {0}")]
    PlanAssignmentConflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl CatalogError {
    /// Shorthand for the most common failure
    pub fn invalid(message: impl Into<String>) -> Self {
        CatalogError::InvalidData(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::BinNotFound(_)
            | CatalogError::SubtypeNotFound(_)
            | CatalogError::AgencyNotFound { .. }
            | CatalogError::PlanNotFound(_)
            | CatalogError::PlanItemNotFound(_)
            | CatalogError::ValidationNotFound(_)
            | CatalogError::MapNotFound { .. } => ErrorKind::NotFound,

            CatalogError::BinAlreadyExists(_)
            | CatalogError::SubtypeAlreadyExists(_)
            | CatalogError::AgencyAlreadyExists { .. }
            | CatalogError::PlanAlreadyExists(_)
            | CatalogError::ValidationAlreadyExists(_)
            | CatalogError::AlreadyExists { .. } => ErrorKind::AlreadyExists,

            CatalogError::InvalidData(_) => ErrorKind::InvalidData,

            CatalogError::ActivateRequiresAgency(_)
            | CatalogError::ConflictRule(_)
            | CatalogError::PlanAssignmentConflict(_) => ErrorKind::ConflictRule,

            CatalogError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Transport status derived from the taxonomy
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists | ErrorKind::ConflictRule => 409,
            ErrorKind::InvalidData => 400,
            ErrorKind::Storage => 500,
        }
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Storage(format!("serialization: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(CatalogError::BinNotFound("123456".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            CatalogError::SubtypeAlreadyExists("ABC".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(CatalogError::invalid("bad").kind(), ErrorKind::InvalidData);
        assert_eq!(
            CatalogError::ActivateRequiresAgency("ABC".into()).kind(),
            ErrorKind::ConflictRule
        );
        assert_eq!(
            CatalogError::PlanAssignmentConflict("P1".into()).kind(),
            ErrorKind::ConflictRule
        );
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(CatalogError::PlanNotFound("P1".into()).http_status(), 404);
        assert_eq!(CatalogError::BinAlreadyExists("123456".into()).http_status(), 409);
        assert_eq!(CatalogError::ConflictRule("x".into()).http_status(), 409);
        assert_eq!(CatalogError::invalid("x").http_status(), 400);
        assert_eq!(CatalogError::Storage("disk".into()).http_status(), 500);
    }

    #[test]
    fn test_messages_name_the_key() {
        let err = CatalogError::AgencyNotFound {
            subtype_code: "SUB".into(),
            agency_code: "01".into(),
        };
        assert_eq!(err.to_string(), "agency 01 not found under subtype SUB");
    }
}
