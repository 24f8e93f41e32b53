// 🏦 Bin Entity - Root of the card-numbering catalog
//
// A BIN (6, 8 or 9 digits) optionally carries an extension configuration.
// Subtypes derive their effective keys from it.

use crate::audit::Audit;
use crate::error::{CatalogError, CatalogResult};
use crate::status::Status;
use crate::store::{matches_status, read_lock, write_lock, BinRepository, Page};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

// ============================================================================
// BIN ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    /// Primary key: 6, 8 or 9 digits
    pub bin: String,

    pub description: Option<String>,

    /// Whether subtypes append an extension to this BIN
    pub uses_extension: bool,

    /// Extension width; only meaningful when uses_extension is set
    pub extension_digits: Option<u8>,

    pub status: Status,

    #[serde(flatten)]
    pub audit: Audit,
}

impl Bin {
    pub fn new(
        bin: String,
        uses_extension: bool,
        extension_digits: Option<u8>,
        description: Option<String>,
        actor: &str,
    ) -> Self {
        Bin {
            bin,
            description,
            uses_extension,
            extension_digits: if uses_extension { extension_digits } else { None },
            status: Status::Active,
            audit: Audit::new(actor),
        }
    }

    /// Extension width in the form key derivation expects
    pub fn extension_width(&self) -> Option<i64> {
        self.extension_digits.map(i64::from)
    }
}

stateful_audited!(Bin);

// ============================================================================
// BIN REGISTRY
// ============================================================================

/// In-memory BIN table
#[derive(Clone, Default)]
pub struct BinRegistry {
    bins: Arc<RwLock<Vec<Bin>>>,
}

impl BinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> CatalogResult<usize> {
        Ok(read_lock(&self.bins)?.len())
    }
}

impl BinRepository for BinRegistry {
    fn find_bin(&self, bin: &str) -> CatalogResult<Option<Bin>> {
        let bins = read_lock(&self.bins)?;
        Ok(bins.iter().find(|b| b.bin == bin).cloned())
    }

    fn insert_bin(&self, bin: &Bin) -> CatalogResult<()> {
        let mut bins = write_lock(&self.bins)?;
        if bins.iter().any(|b| b.bin == bin.bin) {
            return Err(CatalogError::BinAlreadyExists(bin.bin.clone()));
        }
        bins.push(bin.clone());
        Ok(())
    }

    fn update_bin(&self, bin: &Bin) -> CatalogResult<()> {
        let mut bins = write_lock(&self.bins)?;
        match bins.iter_mut().find(|b| b.bin == bin.bin) {
            Some(existing) => *existing = bin.clone(),
            None => bins.push(bin.clone()),
        }
        Ok(())
    }

    fn list_bins(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<Bin>> {
        let bins = read_lock(&self.bins)?;
        let mut matching: Vec<Bin> = bins
            .iter()
            .filter(|b| matches_status(status, b.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.bin.cmp(&b.bin));
        Ok(page.slice(matching))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(number: &str) -> Bin {
        Bin::new(number.to_string(), false, None, None, "tester")
    }

    #[test]
    fn test_bin_creation() {
        let b = Bin::new("123456".to_string(), true, Some(3), None, "tester");
        assert_eq!(b.status, Status::Active);
        assert_eq!(b.extension_width(), Some(3));
        assert_eq!(b.audit.updated_by, "tester");
    }

    #[test]
    fn test_extension_digits_ignored_without_extension() {
        let b = Bin::new("123456".to_string(), false, Some(3), None, "tester");
        assert_eq!(b.extension_digits, None);
    }

    #[test]
    fn test_registry_insert_rejects_duplicates() {
        let registry = BinRegistry::new();
        registry.insert_bin(&bin("123456")).unwrap();

        let err = registry.insert_bin(&bin("123456")).unwrap_err();
        assert_eq!(err, CatalogError::BinAlreadyExists("123456".to_string()));
        assert_eq!(registry.count().unwrap(), 1);
    }

    #[test]
    fn test_registry_update_replaces() {
        let registry = BinRegistry::new();
        let mut b = bin("123456");
        registry.insert_bin(&b).unwrap();

        b.description = Some("Gold".to_string());
        registry.update_bin(&b).unwrap();

        let found = registry.find_bin("123456").unwrap().unwrap();
        assert_eq!(found.description.as_deref(), Some("Gold"));
        assert!(registry.bin_exists("123456").unwrap());
        assert!(!registry.bin_exists("654321").unwrap());
    }

    #[test]
    fn test_registry_list_filters_and_pages() {
        let registry = BinRegistry::new();
        for number in ["333333", "111111", "222222"] {
            registry.insert_bin(&bin(number)).unwrap();
        }
        let mut inactive = bin("444444");
        inactive.status = Status::Inactive;
        registry.insert_bin(&inactive).unwrap();

        let active = registry.list_bins(Some(Status::Active), Page::default()).unwrap();
        let numbers: Vec<&str> = active.iter().map(|b| b.bin.as_str()).collect();
        assert_eq!(numbers, vec!["111111", "222222", "333333"]);

        let second_page = registry.list_bins(None, Page::new(2, 2)).unwrap();
        assert_eq!(second_page.len(), 2);
        assert_eq!(second_page[0].bin, "333333");
    }
}
