// 📥 Plan Item Admission - Format rules and bulk de-duplication
//
// Single adds fail on the first problem. Bulk adds never partially fail:
// every value is classified (inserted / duplicate / invalid) and the batch
// produces one summary record.

use crate::entities::ValidationMode;
use crate::error::{CatalogError, CatalogResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Width of an MCC
pub const MCC_DIGITS: usize = 4;

/// Default width of a MERCHANT_ID item (ISO 8583 card acceptor id)
pub const DEFAULT_MERCHANT_ID_DIGITS: usize = 15;

// ============================================================================
// FORMAT RULES
// ============================================================================

/// Item format rules for each plan mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemFormat {
    pub merchant_id_digits: usize,
}

impl Default for ItemFormat {
    fn default() -> Self {
        ItemFormat {
            merchant_id_digits: DEFAULT_MERCHANT_ID_DIGITS,
        }
    }
}

impl ItemFormat {
    /// Check a (trimmed) value against the plan's mode
    pub fn check(&self, mode: ValidationMode, value: &str) -> CatalogResult<()> {
        match mode {
            ValidationMode::Unique => Err(CatalogError::invalid(
                "plans in UNIQUE mode do not accept items",
            )),
            ValidationMode::Mcc => expect_digits(value, MCC_DIGITS, "MCC"),
            ValidationMode::MerchantId => {
                expect_digits(value, self.merchant_id_digits, "merchant id")
            }
        }
    }
}

fn expect_digits(value: &str, width: usize, label: &str) -> CatalogResult<()> {
    if value.len() == width && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(CatalogError::invalid(format!(
            "{} must be exactly {} digits, got '{}'",
            label, width, value
        )))
    }
}

// ============================================================================
// BULK ADMISSION
// ============================================================================

/// Outcome of a bulk add, reported to the caller as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAddSummary {
    pub total_received: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub duplicate_values: Vec<String>,
    pub invalid_values: Vec<String>,
}

impl BulkAddSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} received: {} inserted, {} duplicates, {} invalid",
            self.total_received, self.inserted, self.duplicates, self.invalid
        )
    }
}

/// Values cleared for insertion plus the summary they produce
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAdmission {
    pub accepted: Vec<String>,
    pub summary: BulkAddSummary,
}

/// Classify a batch against the values already stored for the plan.
///
/// Values are trimmed first. A value repeated inside the batch counts as a
/// duplicate from its second occurrence on.
pub fn admit_bulk(
    format: &ItemFormat,
    mode: ValidationMode,
    raw_values: &[String],
    existing: &HashSet<String>,
) -> CatalogResult<BulkAdmission> {
    if mode == ValidationMode::Unique {
        return Err(CatalogError::invalid(
            "plans in UNIQUE mode do not accept items",
        ));
    }

    let mut seen: HashSet<String> = existing.clone();
    let mut accepted = Vec::new();
    let mut summary = BulkAddSummary {
        total_received: raw_values.len(),
        ..BulkAddSummary::default()
    };

    for raw in raw_values {
        let value = raw.trim();

        if format.check(mode, value).is_err() {
            summary.invalid_values.push(value.to_string());
            continue;
        }

        if !seen.insert(value.to_string()) {
            summary.duplicate_values.push(value.to_string());
            continue;
        }

        accepted.push(value.to_string());
    }

    summary.inserted = accepted.len();
    summary.duplicates = summary.duplicate_values.len();
    summary.invalid = summary.invalid_values.len();

    Ok(BulkAdmission { accepted, summary })
}

// ============================================================================
// TESTS
// ============================================================================
