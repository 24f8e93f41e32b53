// 🏢 Agency Entity - Operational unit under a subtype
//
// Keyed by (subtype_code, agency_code). A subtype can only be active while
// at least one of its agencies is.

use crate::audit::Audit;
use crate::error::{CatalogError, CatalogResult};
use crate::status::Status;
use crate::store::{matches_status, read_lock, write_lock, AgencyRepository, Page};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub subtype_code: String,
    pub agency_code: String,
    pub name: Option<String>,
    pub status: Status,

    #[serde(flatten)]
    pub audit: Audit,
}

impl Agency {
    pub fn new(subtype_code: String, agency_code: String, name: Option<String>, actor: &str) -> Self {
        Agency {
            subtype_code,
            agency_code,
            name,
            status: Status::Active,
            audit: Audit::new(actor),
        }
    }

    fn same_key(&self, subtype_code: &str, agency_code: &str) -> bool {
        self.subtype_code == subtype_code && self.agency_code == agency_code
    }
}

stateful_audited!(Agency);

// ============================================================================
// AGENCY REGISTRY
// ============================================================================

#[derive(Clone, Default)]
pub struct AgencyRegistry {
    agencies: Arc<RwLock<Vec<Agency>>>,
}

impl AgencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgencyRepository for AgencyRegistry {
    fn find_agency(&self, subtype_code: &str, agency_code: &str) -> CatalogResult<Option<Agency>> {
        let agencies = read_lock(&self.agencies)?;
        Ok(agencies
            .iter()
            .find(|a| a.same_key(subtype_code, agency_code))
            .cloned())
    }

    fn count_active_agencies(
        &self,
        subtype_code: &str,
        excluding: Option<&str>,
    ) -> CatalogResult<usize> {
        let agencies = read_lock(&self.agencies)?;
        Ok(agencies
            .iter()
            .filter(|a| a.subtype_code == subtype_code && a.status.is_active())
            .filter(|a| excluding.map_or(true, |code| a.agency_code != code))
            .count())
    }

    fn insert_agency(&self, agency: &Agency) -> CatalogResult<()> {
        let mut agencies = write_lock(&self.agencies)?;
        if agencies
            .iter()
            .any(|a| a.same_key(&agency.subtype_code, &agency.agency_code))
        {
            return Err(CatalogError::AgencyAlreadyExists {
                subtype_code: agency.subtype_code.clone(),
                agency_code: agency.agency_code.clone(),
            });
        }
        agencies.push(agency.clone());
        Ok(())
    }

    fn update_agency(&self, agency: &Agency) -> CatalogResult<()> {
        let mut agencies = write_lock(&self.agencies)?;
        match agencies
            .iter_mut()
            .find(|a| a.same_key(&agency.subtype_code, &agency.agency_code))
        {
            Some(existing) => *existing = agency.clone(),
            None => agencies.push(agency.clone()),
        }
        Ok(())
    }

    fn list_agencies(
        &self,
        subtype_code: &str,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Agency>> {
        let agencies = read_lock(&self.agencies)?;
        let mut matching: Vec<Agency> = agencies
            .iter()
            .filter(|a| a.subtype_code == subtype_code && matches_status(status, a.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.agency_code.cmp(&b.agency_code));
        Ok(page.slice(matching))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agency(subtype: &str, code: &str, status: Status) -> Agency {
        let mut a = Agency::new(subtype.into(), code.into(), None, "tester");
        a.status = status;
        a
    }

    #[test]
    fn test_count_active_excluding() {
        let registry = AgencyRegistry::new();
        registry.insert_agency(&agency("SUB", "01", Status::Active)).unwrap();
        registry.insert_agency(&agency("SUB", "02", Status::Inactive)).unwrap();
        registry.insert_agency(&agency("OTHER", "01", Status::Active)).unwrap();

        assert_eq!(registry.count_active_agencies("SUB", None).unwrap(), 1);
        assert_eq!(registry.count_active_agencies("SUB", Some("01")).unwrap(), 0);
        assert_eq!(registry.count_active_agencies("SUB", Some("02")).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let registry = AgencyRegistry::new();
        registry.insert_agency(&agency("SUB", "01", Status::Active)).unwrap();
        let err = registry
            .insert_agency(&agency("SUB", "01", Status::Active))
            .unwrap_err();
        assert!(matches!(err, CatalogError::AgencyAlreadyExists { .. }));
    }

    #[test]
    fn test_list_is_scoped_to_subtype() {
        let registry = AgencyRegistry::new();
        registry.insert_agency(&agency("SUB", "02", Status::Active)).unwrap();
        registry.insert_agency(&agency("SUB", "01", Status::Inactive)).unwrap();
        registry.insert_agency(&agency("OTHER", "03", Status::Active)).unwrap();

        let all = registry.list_agencies("SUB", None, Page::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].agency_code, "01");

        let active = registry
            .list_agencies("SUB", Some(Status::Active), Page::default())
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].agency_code, "02");
    }
}
