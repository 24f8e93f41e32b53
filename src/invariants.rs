// 🛡️ Catalog Invariants - Cross-entity preconditions
//
// Every check reads through the store ports and either returns the loaded
// aggregate or a typed failure. The store's unique constraints back these
// pre-checks up; a racing writer surfaces as the same error.

use crate::entities::{Bin, CommercePlan, Subtype, Validation};
use crate::error::{CatalogError, CatalogResult};
use crate::status::Status;
use crate::store::{
    AgencyRepository, BinRepository, CatalogStore, PlanRepository, SubtypeRepository,
    ValidationRepository,
};
use tracing::debug;

// ============================================================================
// EXISTENCE
// ============================================================================

pub fn require_bin<S: CatalogStore>(store: &S, bin: &str) -> CatalogResult<Bin> {
    store
        .bins()
        .find_bin(bin)?
        .ok_or_else(|| CatalogError::BinNotFound(bin.to_string()))
}

pub fn require_subtype<S: CatalogStore>(store: &S, subtype_code: &str) -> CatalogResult<Subtype> {
    store
        .subtypes()
        .find_subtype(subtype_code)?
        .ok_or_else(|| CatalogError::SubtypeNotFound(subtype_code.to_string()))
}

pub fn require_plan<S: CatalogStore>(store: &S, plan_code: &str) -> CatalogResult<CommercePlan> {
    store
        .plans()
        .find_plan_by_code(plan_code)?
        .ok_or_else(|| CatalogError::PlanNotFound(plan_code.to_string()))
}

pub fn require_validation<S: CatalogStore>(
    store: &S,
    validation_code: &str,
) -> CatalogResult<Validation> {
    store
        .validations()
        .find_validation_by_code(validation_code)?
        .ok_or_else(|| CatalogError::ValidationNotFound(validation_code.to_string()))
}

/// The subtype addressed by (subtype_code, bin).
///
/// `bin` must be the subtype's effective key, or its master BIN when it has none.
pub fn require_subtype_pair<S: CatalogStore>(
    store: &S,
    subtype_code: &str,
    bin: &str,
) -> CatalogResult<Subtype> {
    let subtype = require_subtype(store, subtype_code)?;
    if !subtype.answers_to(bin) {
        debug!(subtype_code, bin, "BIN does not address subtype");
        return Err(CatalogError::BinNotFound(format!(
            "{} (not a BIN of subtype {})",
            bin, subtype_code
        )));
    }
    Ok(subtype)
}

// ============================================================================
// UNIQUENESS / COLLISIONS
// ============================================================================

/// A new BIN must not exist yet, nor equal any subtype's derived key
pub fn ensure_bin_available<S: CatalogStore>(store: &S, bin: &str) -> CatalogResult<()> {
    if store.bins().bin_exists(bin)? {
        return Err(CatalogError::BinAlreadyExists(bin.to_string()));
    }
    if let Some(owner) = store.subtypes().find_subtype_by_effective_key(bin)? {
        return Err(CatalogError::BinAlreadyExists(format!(
            "{} (derived key of subtype {})",
            bin, owner.subtype_code
        )));
    }
    Ok(())
}

/// (bin, subtype_code) must be new, and the code unused under any other BIN
pub fn ensure_subtype_code_available<S: CatalogStore>(
    store: &S,
    bin: &str,
    subtype_code: &str,
) -> CatalogResult<()> {
    if store.subtypes().find_subtype_by_key(bin, subtype_code)?.is_some() {
        return Err(CatalogError::SubtypeAlreadyExists(format!(
            "{} already exists under BIN {}",
            subtype_code, bin
        )));
    }
    if let Some(other) = store.subtypes().find_subtype(subtype_code)? {
        return Err(CatalogError::SubtypeAlreadyExists(format!(
            "{} is already used under BIN {}",
            subtype_code, other.bin
        )));
    }
    Ok(())
}

/// The candidate's derived key must not collide with another master BIN or
/// another subtype. A subtype sitting directly on a 9-digit BIN shares that
/// BIN's number, so its own parent is not a collision.
pub fn ensure_effective_key_free<S: CatalogStore>(
    store: &S,
    candidate: &Subtype,
) -> CatalogResult<()> {
    let key = match &candidate.effective_key {
        Some(key) => key,
        None => return Ok(()),
    };

    if key != &candidate.bin && store.bins().bin_exists(key)? {
        return Err(CatalogError::BinAlreadyExists(format!(
            "{} (derived key of subtype {})",
            key, candidate.subtype_code
        )));
    }

    if let Some(extension) = &candidate.extension {
        if let Some(other) = store
            .subtypes()
            .find_subtype_by_extension(&candidate.bin, extension)?
        {
            if other.subtype_code != candidate.subtype_code {
                return Err(CatalogError::SubtypeAlreadyExists(format!(
                    "BIN {} extension {} is used by subtype {}",
                    candidate.bin, extension, other.subtype_code
                )));
            }
        }
    }

    if let Some(other) = store.subtypes().find_subtype_by_effective_key(key)? {
        if other.subtype_code != candidate.subtype_code {
            return Err(CatalogError::SubtypeAlreadyExists(format!(
                "effective key {} is used by subtype {}",
                key, other.subtype_code
            )));
        }
    }

    Ok(())
}

/// Owner id type must be a known code when supplied
pub fn check_owner_id_type<S: CatalogStore>(
    store: &S,
    owner_id_type: Option<&str>,
) -> CatalogResult<()> {
    let code = match owner_id_type {
        Some(code) => code,
        None => return Ok(()),
    };

    let known = store.id_types().id_type_codes()?;
    if known.iter().any(|k| k == code) {
        return Ok(());
    }

    if known.is_empty() {
        Err(CatalogError::invalid(format!(
            "owner id type '{}' is not valid: no identification types are configured",
            code
        )))
    } else {
        Err(CatalogError::invalid(format!(
            "owner id type '{}' is not valid, allowed: {}",
            code,
            known.join(", ")
        )))
    }
}

// ============================================================================
// STATUS PRECONDITIONS
// ============================================================================

/// A subtype can only become active with at least one active agency
pub fn activation_requires_agency<S: CatalogStore>(
    store: &S,
    subtype_code: &str,
) -> CatalogResult<()> {
    let active = store.agencies().count_active_agencies(subtype_code, None)?;
    if active == 0 {
        return Err(CatalogError::ActivateRequiresAgency(subtype_code.to_string()));
    }
    Ok(())
}

/// Deactivating an agency must leave another active one under the subtype
pub fn deactivation_keeps_agency<S: CatalogStore>(
    store: &S,
    subtype_code: &str,
    agency_code: &str,
) -> CatalogResult<()> {
    let others = store
        .agencies()
        .count_active_agencies(subtype_code, Some(agency_code))?;
    if others == 0 {
        return Err(CatalogError::ConflictRule(format!(
            "subtype {} must keep one active agency; {} is the last one",
            subtype_code, agency_code
        )));
    }
    Ok(())
}

/// A plan can only be linked while it has at least one active item
pub fn plan_assignable<S: CatalogStore>(store: &S, plan: &CommercePlan) -> CatalogResult<()> {
    let active_items = store
        .plans()
        .count_plan_items(plan.plan_id, Some(Status::Active))?;
    if active_items == 0 {
        return Err(CatalogError::PlanAssignmentConflict(format!(
            "plan {} has no active items",
            plan.code
        )));
    }
    Ok(())
}

/// Extension config of a BIN is frozen once subtypes derive keys from it
pub fn extension_config_unlocked<S: CatalogStore>(store: &S, bin: &Bin) -> CatalogResult<()> {
    let subtypes = store.subtypes().count_subtypes_for_bin(&bin.bin)?;
    if subtypes > 0 {
        return Err(CatalogError::ConflictRule(format!(
            "BIN {} has {} subtypes; its extension configuration cannot change",
            bin.bin, subtypes
        )));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Agency, CommercePlan, PlanItem, ValidationMode};
    use crate::store::MemoryStore;

    fn store_with_bin(bin: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .bins()
            .insert_bin(&Bin::new(bin.into(), true, Some(3), None, "t"))
            .unwrap();
        store
    }

    fn subtype(bin: &str, code: &str, ext: Option<&str>) -> Subtype {
        let mut s = Subtype::new(bin.into(), code.into(), "t");
        s.extension = ext.map(str::to_string);
        s.effective_key = crate::key_derivation::derived_key_for(bin, ext);
        s
    }

    #[test]
    fn test_require_bin() {
        let store = store_with_bin("123456");
        assert!(require_bin(&store, "123456").is_ok());
        assert_eq!(
            require_bin(&store, "654321").unwrap_err(),
            CatalogError::BinNotFound("654321".into())
        );
    }

    #[test]
    fn test_bin_collides_with_derived_key() {
        let store = store_with_bin("123456");
        store
            .subtypes()
            .insert_subtype(&subtype("123456", "ABC", Some("007")))
            .unwrap();

        assert!(matches!(
            ensure_bin_available(&store, "123456007"),
            Err(CatalogError::BinAlreadyExists(_))
        ));
        assert!(matches!(
            ensure_bin_available(&store, "123456"),
            Err(CatalogError::BinAlreadyExists(_))
        ));
        assert!(ensure_bin_available(&store, "999999").is_ok());
    }

    #[test]
    fn test_derived_key_collides_with_master_bin() {
        let store = store_with_bin("123456");
        store
            .bins()
            .insert_bin(&Bin::new("123456007".into(), false, None, None, "t"))
            .unwrap();

        let err = ensure_effective_key_free(&store, &subtype("123456", "ABC", Some("007")))
            .unwrap_err();
        assert!(matches!(err, CatalogError::BinAlreadyExists(_)));
    }

    #[test]
    fn test_nine_digit_bin_subtype_is_not_its_own_collision() {
        let store = MemoryStore::new();
        store
            .bins()
            .insert_bin(&Bin::new("123456789".into(), false, None, None, "t"))
            .unwrap();

        let first = subtype("123456789", "ABC", None);
        assert!(ensure_effective_key_free(&store, &first).is_ok());
        store.subtypes().insert_subtype(&first).unwrap();

        // a second extension-less subtype would share the same key
        let second = subtype("123456789", "DEF", None);
        assert!(matches!(
            ensure_effective_key_free(&store, &second),
            Err(CatalogError::SubtypeAlreadyExists(_))
        ));
    }

    #[test]
    fn test_subtype_code_unique_across_bins() {
        let store = store_with_bin("123456");
        store
            .subtypes()
            .insert_subtype(&subtype("123456", "ABC", Some("001")))
            .unwrap();

        assert!(ensure_subtype_code_available(&store, "123456", "ABC").is_err());
        assert!(ensure_subtype_code_available(&store, "654321", "ABC").is_err());
        assert!(ensure_subtype_code_available(&store, "123456", "DEF").is_ok());
    }

    #[test]
    fn test_owner_id_type_messages() {
        let empty = MemoryStore::new();
        let err = check_owner_id_type(&empty, Some("CC")).unwrap_err();
        assert!(err.to_string().contains("no identification types are configured"));

        let seeded = MemoryStore::with_id_types(&["CC", "NIT"]).unwrap();
        assert!(check_owner_id_type(&seeded, Some("CC")).is_ok());
        assert!(check_owner_id_type(&seeded, None).is_ok());
        let err = check_owner_id_type(&seeded, Some("XX")).unwrap_err();
        assert!(err.to_string().contains("allowed: CC, NIT"));
    }

    #[test]
    fn test_agency_preconditions() {
        let store = MemoryStore::new();
        assert!(matches!(
            activation_requires_agency(&store, "SUB"),
            Err(CatalogError::ActivateRequiresAgency(_))
        ));

        store
            .agencies()
            .insert_agency(&Agency::new("SUB".into(), "01".into(), None, "t"))
            .unwrap();
        assert!(activation_requires_agency(&store, "SUB").is_ok());
        assert!(matches!(
            deactivation_keeps_agency(&store, "SUB", "01"),
            Err(CatalogError::ConflictRule(_))
        ));

        store
            .agencies()
            .insert_agency(&Agency::new("SUB".into(), "02".into(), None, "t"))
            .unwrap();
        assert!(deactivation_keeps_agency(&store, "SUB", "01").is_ok());
    }

    #[test]
    fn test_plan_assignable_needs_active_item() {
        let store = MemoryStore::new();
        let id = store
            .plans()
            .insert_plan(&CommercePlan::new("P1".into(), None, ValidationMode::Mcc, "t"))
            .unwrap();
        let plan = store.plans().find_plan(id).unwrap().unwrap();

        assert!(matches!(
            plan_assignable(&store, &plan),
            Err(CatalogError::PlanAssignmentConflict(_))
        ));

        store
            .plans()
            .insert_plan_item(&PlanItem::new(id, "1234".into(), "t"))
            .unwrap();
        assert!(plan_assignable(&store, &plan).is_ok());
    }
}
