// 📨 Commands - Primitive/string inputs to the engine
//
// These double as JSON request bodies for the API server. Nothing here is
// trusted: the engine parses and validates every field.

use crate::error::{CatalogError, CatalogResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// BINS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBin {
    pub bin: String,
    /// "Y" / "N"
    pub uses_extension: String,
    #[serde(default)]
    pub extension_digits: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinChanges {
    pub uses_extension: String,
    #[serde(default)]
    pub extension_digits: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// SUBTYPES / AGENCIES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSubtype {
    pub bin: String,
    pub subtype_code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub owner_id_type: Option<String>,
    #[serde(default)]
    pub owner_id_number: Option<String>,
}

/// Full replacement of a subtype's mutable fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtypeChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub owner_id_type: Option<String>,
    #[serde(default)]
    pub owner_id_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAgency {
    pub subtype_code: String,
    pub agency_code: String,
    #[serde(default)]
    pub name: Option<String>,
}

// ============================================================================
// PLANS / VALIDATIONS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPlan {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    /// UNIQUE | MCC | MERCHANT_ID
    pub validation_mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanChanges {
    #[serde(default)]
    pub name: Option<String>,
    pub validation_mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewValidation {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    /// BOOL | NUMBER | TEXT
    pub data_type: String,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Parse a Y/N style flag
pub fn parse_yes_no(field: &str, raw: &str) -> CatalogResult<bool> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "Y" | "YES" | "S" | "SI" | "TRUE" => Ok(true),
        "N" | "NO" | "FALSE" => Ok(false),
        other => Err(CatalogError::invalid(format!(
            "{} must be 'Y' or 'N', got '{}'",
            field, other
        ))),
    }
}

/// Trim a required code; blank fails
pub fn required(field: &str, raw: &str) -> CatalogResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(CatalogError::invalid(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Trim an optional field; blank becomes None
pub fn optional(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
