// 🧩 Subtype Entity - Sub-range of a BIN
//
// Identified by (bin, subtype_code); subtype codes are also unique across
// BINs because agencies and plan links reference a subtype by code alone.

use crate::audit::Audit;
use crate::error::{CatalogError, CatalogResult};
use crate::status::Status;
use crate::store::{matches_status, read_lock, write_lock, Page, SubtypeRepository};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

// ============================================================================
// SUBTYPE ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtype {
    pub bin: String,
    pub subtype_code: String,
    pub name: Option<String>,

    /// Zero-padded to the BIN's extension width
    pub extension: Option<String>,

    /// BIN + extension; recomputed whenever the extension changes
    pub effective_key: Option<String>,

    pub owner_id_type: Option<String>,
    pub owner_id_number: Option<String>,

    pub status: Status,

    #[serde(flatten)]
    pub audit: Audit,
}

impl Subtype {
    /// New subtypes start inactive: they have no agencies yet
    pub fn new(bin: String, subtype_code: String, actor: &str) -> Self {
        Subtype {
            bin,
            subtype_code,
            name: None,
            extension: None,
            effective_key: None,
            owner_id_type: None,
            owner_id_number: None,
            status: Status::Inactive,
            audit: Audit::new(actor),
        }
    }

    /// Does `bin` address this subtype? Its derived key when it has one,
    /// otherwise its master BIN.
    pub fn answers_to(&self, bin: &str) -> bool {
        self.addressable_bin() == bin
    }

    /// The BIN a validation map should be keyed by
    pub fn addressable_bin(&self) -> &str {
        self.effective_key.as_deref().unwrap_or(&self.bin)
    }
}

stateful_audited!(Subtype);

// ============================================================================
// SUBTYPE REGISTRY
// ============================================================================

/// In-memory subtype table with the same unique constraints as the schema:
/// subtype_code, (bin, extension) and effective_key.
#[derive(Clone, Default)]
pub struct SubtypeRegistry {
    subtypes: Arc<RwLock<Vec<Subtype>>>,
}

impl SubtypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique(existing: &[Subtype], candidate: &Subtype) -> CatalogResult<()> {
        for other in existing
            .iter()
            .filter(|s| s.subtype_code != candidate.subtype_code)
        {
            if other.bin == candidate.bin
                && other.extension.is_some()
                && other.extension == candidate.extension
            {
                return Err(CatalogError::SubtypeAlreadyExists(format!(
                    "BIN {} extension {} is used by subtype {}",
                    candidate.bin,
                    candidate.extension.as_deref().unwrap_or_default(),
                    other.subtype_code
                )));
            }
            if other.effective_key.is_some() && other.effective_key == candidate.effective_key {
                return Err(CatalogError::SubtypeAlreadyExists(format!(
                    "effective key {} is used by subtype {}",
                    candidate.effective_key.as_deref().unwrap_or_default(),
                    other.subtype_code
                )));
            }
        }
        Ok(())
    }
}

impl SubtypeRepository for SubtypeRegistry {
    fn find_subtype(&self, subtype_code: &str) -> CatalogResult<Option<Subtype>> {
        let subtypes = read_lock(&self.subtypes)?;
        Ok(subtypes
            .iter()
            .find(|s| s.subtype_code == subtype_code)
            .cloned())
    }

    fn find_subtype_by_key(
        &self,
        bin: &str,
        subtype_code: &str,
    ) -> CatalogResult<Option<Subtype>> {
        let subtypes = read_lock(&self.subtypes)?;
        Ok(subtypes
            .iter()
            .find(|s| s.bin == bin && s.subtype_code == subtype_code)
            .cloned())
    }

    fn find_subtype_by_extension(
        &self,
        bin: &str,
        extension: &str,
    ) -> CatalogResult<Option<Subtype>> {
        let subtypes = read_lock(&self.subtypes)?;
        Ok(subtypes
            .iter()
            .find(|s| s.bin == bin && s.extension.as_deref() == Some(extension))
            .cloned())
    }

    fn find_subtype_by_effective_key(
        &self,
        effective_key: &str,
    ) -> CatalogResult<Option<Subtype>> {
        let subtypes = read_lock(&self.subtypes)?;
        Ok(subtypes
            .iter()
            .find(|s| s.effective_key.as_deref() == Some(effective_key))
            .cloned())
    }

    fn count_subtypes_for_bin(&self, bin: &str) -> CatalogResult<usize> {
        let subtypes = read_lock(&self.subtypes)?;
        Ok(subtypes.iter().filter(|s| s.bin == bin).count())
    }

    fn insert_subtype(&self, subtype: &Subtype) -> CatalogResult<()> {
        let mut subtypes = write_lock(&self.subtypes)?;
        if let Some(existing) = subtypes
            .iter()
            .find(|s| s.subtype_code == subtype.subtype_code)
        {
            return Err(CatalogError::SubtypeAlreadyExists(format!(
                "subtype code {} is already registered under BIN {}",
                subtype.subtype_code, existing.bin
            )));
        }
        Self::check_unique(&subtypes, subtype)?;
        subtypes.push(subtype.clone());
        Ok(())
    }

    fn update_subtype(&self, subtype: &Subtype) -> CatalogResult<()> {
        let mut subtypes = write_lock(&self.subtypes)?;
        Self::check_unique(&subtypes, subtype)?;
        match subtypes
            .iter_mut()
            .find(|s| s.subtype_code == subtype.subtype_code)
        {
            Some(existing) => *existing = subtype.clone(),
            None => subtypes.push(subtype.clone()),
        }
        Ok(())
    }

    fn list_subtypes(
        &self,
        bin: Option<&str>,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Subtype>> {
        let subtypes = read_lock(&self.subtypes)?;
        let mut matching: Vec<Subtype> = subtypes
            .iter()
            .filter(|s| bin.map_or(true, |b| s.bin == b))
            .filter(|s| matches_status(status, s.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.bin
                .cmp(&b.bin)
                .then_with(|| a.subtype_code.cmp(&b.subtype_code))
        });
        Ok(page.slice(matching))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn subtype(bin: &str, code: &str, extension: Option<&str>) -> Subtype {
        let mut s = Subtype::new(bin.to_string(), code.to_string(), "tester");
        s.extension = extension.map(str::to_string);
        s.effective_key = extension.map(|e| format!("{}{}", bin, e));
        s
    }

    #[test]
    fn test_new_subtype_is_inactive() {
        let s = Subtype::new("123456".into(), "ABC".into(), "tester");
        assert_eq!(s.status, Status::Inactive);
        assert!(s.effective_key.is_none());
    }

    #[test]
    fn test_answers_to() {
        let with_key = subtype("123456", "ABC", Some("007"));
        assert!(with_key.answers_to("123456007"));
        assert!(!with_key.answers_to("123456"));

        let without_key = subtype("123456", "DEF", None);
        assert!(without_key.answers_to("123456"));
        assert_eq!(without_key.addressable_bin(), "123456");
    }

    #[test]
    fn test_code_is_globally_unique() {
        let registry = SubtypeRegistry::new();
        registry.insert_subtype(&subtype("123456", "ABC", None)).unwrap();

        let err = registry
            .insert_subtype(&subtype("654321", "ABC", None))
            .unwrap_err();
        assert!(matches!(err, CatalogError::SubtypeAlreadyExists(_)));
    }

    #[test]
    fn test_extension_is_unique_per_bin() {
        let registry = SubtypeRegistry::new();
        registry
            .insert_subtype(&subtype("123456", "ABC", Some("007")))
            .unwrap();

        let err = registry
            .insert_subtype(&subtype("123456", "DEF", Some("007")))
            .unwrap_err();
        assert!(matches!(err, CatalogError::SubtypeAlreadyExists(_)));

        // same extension under a different BIN is fine
        registry
            .insert_subtype(&subtype("654321", "GHI", Some("007")))
            .unwrap();
    }

    #[test]
    fn test_update_can_keep_own_key() {
        let registry = SubtypeRegistry::new();
        let mut s = subtype("123456", "ABC", Some("007"));
        registry.insert_subtype(&s).unwrap();

        s.name = Some("Renamed".into());
        registry.update_subtype(&s).unwrap();

        let found = registry.find_subtype_by_effective_key("123456007").unwrap();
        assert_eq!(found.unwrap().name.as_deref(), Some("Renamed"));
    }

    #[test]
    fn test_list_by_bin() {
        let registry = SubtypeRegistry::new();
        registry.insert_subtype(&subtype("123456", "B", Some("002"))).unwrap();
        registry.insert_subtype(&subtype("123456", "A", Some("001"))).unwrap();
        registry.insert_subtype(&subtype("654321", "C", None)).unwrap();

        let listed = registry
            .list_subtypes(Some("123456"), None, Page::default())
            .unwrap();
        let codes: Vec<&str> = listed.iter().map(|s| s.subtype_code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B"]);
        assert_eq!(registry.count_subtypes_for_bin("654321").unwrap(), 1);
    }
}
