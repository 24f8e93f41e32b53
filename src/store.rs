// 🗃️ Store Ports - Read/write interfaces the engine runs against
//
// One repository per aggregate. Implementations:
// - MemoryStore: in-memory registries (tests, embedding)
// - SqliteStore (db.rs): rusqlite, one transaction per unit of work
//
// Write methods come in two flavours: insert_* fails on a natural-key
// collision with the same *AlreadyExists error the engine's pre-check would
// raise; update_* upserts by key.

use crate::audit::Event;
use crate::entities::{
    Agency, AgencyRegistry, Bin, BinRegistry, CommercePlan, PlanItem, PlanRegistry, Subtype,
    SubtypePlanLink, SubtypeRegistry, Validation, ValidationMap, ValidationRegistry,
};
use crate::error::{CatalogError, CatalogResult};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// PAGING
// ============================================================================

pub const DEFAULT_PAGE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Page {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Page { offset, limit }
    }

    /// Clamp limit into [1, max]
    pub fn clamp(self, max: usize) -> Page {
        Page {
            offset: self.offset,
            limit: self.limit.clamp(1, max.max(1)),
        }
    }

    pub fn slice<T, I>(&self, items: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

// ============================================================================
// REPOSITORY PORTS
// ============================================================================

pub trait BinRepository {
    fn find_bin(&self, bin: &str) -> CatalogResult<Option<Bin>>;

    fn bin_exists(&self, bin: &str) -> CatalogResult<bool> {
        Ok(self.find_bin(bin)?.is_some())
    }

    fn insert_bin(&self, bin: &Bin) -> CatalogResult<()>;
    fn update_bin(&self, bin: &Bin) -> CatalogResult<()>;
    fn list_bins(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<Bin>>;
}

pub trait SubtypeRepository {
    /// Subtype codes are unique across BINs
    fn find_subtype(&self, subtype_code: &str) -> CatalogResult<Option<Subtype>>;

    fn find_subtype_by_key(&self, bin: &str, subtype_code: &str)
        -> CatalogResult<Option<Subtype>>;

    fn find_subtype_by_extension(&self, bin: &str, extension: &str)
        -> CatalogResult<Option<Subtype>>;

    fn find_subtype_by_effective_key(&self, effective_key: &str)
        -> CatalogResult<Option<Subtype>>;

    fn count_subtypes_for_bin(&self, bin: &str) -> CatalogResult<usize>;

    fn insert_subtype(&self, subtype: &Subtype) -> CatalogResult<()>;
    fn update_subtype(&self, subtype: &Subtype) -> CatalogResult<()>;

    fn list_subtypes(
        &self,
        bin: Option<&str>,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Subtype>>;
}

pub trait AgencyRepository {
    fn find_agency(&self, subtype_code: &str, agency_code: &str) -> CatalogResult<Option<Agency>>;

    /// Active agencies under a subtype, optionally ignoring one agency code
    fn count_active_agencies(
        &self,
        subtype_code: &str,
        excluding: Option<&str>,
    ) -> CatalogResult<usize>;

    fn insert_agency(&self, agency: &Agency) -> CatalogResult<()>;
    fn update_agency(&self, agency: &Agency) -> CatalogResult<()>;

    fn list_agencies(
        &self,
        subtype_code: &str,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Agency>>;
}

pub trait PlanRepository {
    fn find_plan(&self, plan_id: i64) -> CatalogResult<Option<CommercePlan>>;
    fn find_plan_by_code(&self, code: &str) -> CatalogResult<Option<CommercePlan>>;

    /// Returns the assigned plan_id
    fn insert_plan(&self, plan: &CommercePlan) -> CatalogResult<i64>;

    /// Must reject a validation_mode change while the plan has items
    fn update_plan(&self, plan: &CommercePlan) -> CatalogResult<()>;

    fn list_plans(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<CommercePlan>>;

    fn find_plan_item(&self, plan_item_id: i64) -> CatalogResult<Option<PlanItem>>;
    fn plan_item_values(&self, plan_id: i64) -> CatalogResult<Vec<String>>;
    fn count_plan_items(&self, plan_id: i64, status: Option<Status>) -> CatalogResult<usize>;

    /// Returns the assigned plan_item_id
    fn insert_plan_item(&self, item: &PlanItem) -> CatalogResult<i64>;
    fn update_plan_item(&self, item: &PlanItem) -> CatalogResult<()>;

    fn list_plan_items(
        &self,
        plan_id: i64,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<PlanItem>>;

    fn find_plan_link(&self, subtype_code: &str) -> CatalogResult<Option<SubtypePlanLink>>;

    /// Upsert by subtype_code: a subtype has at most one link
    fn save_plan_link(&self, link: &SubtypePlanLink) -> CatalogResult<()>;
}

pub trait ValidationRepository {
    fn find_validation_by_code(&self, code: &str) -> CatalogResult<Option<Validation>>;

    /// Returns the assigned validation_id
    fn insert_validation(&self, validation: &Validation) -> CatalogResult<i64>;
    fn update_validation(&self, validation: &Validation) -> CatalogResult<()>;

    fn list_validations(
        &self,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Validation>>;

    fn find_validation_map(
        &self,
        subtype_code: &str,
        bin: &str,
        validation_id: i64,
    ) -> CatalogResult<Option<ValidationMap>>;

    fn insert_validation_map(&self, map: &ValidationMap) -> CatalogResult<()>;
    fn update_validation_map(&self, map: &ValidationMap) -> CatalogResult<()>;

    /// Moves a subtype's maps from one BIN to another; returns how many moved
    fn rekey_validation_maps(
        &self,
        subtype_code: &str,
        from_bin: &str,
        to_bin: &str,
    ) -> CatalogResult<usize>;

    fn list_validation_maps(
        &self,
        subtype_code: &str,
        bin: Option<&str>,
        page: Page,
    ) -> CatalogResult<Vec<ValidationMap>>;
}

/// Known owner identification types (e.g. "CC", "NIT")
pub trait IdTypeCatalog {
    fn id_type_codes(&self) -> CatalogResult<Vec<String>>;
}

pub trait AuditTrail {
    fn record_event(&self, event: &Event) -> CatalogResult<()>;
}

/// Everything the engine needs for one unit of work
pub trait CatalogStore {
    type Bins: BinRepository;
    type Subtypes: SubtypeRepository;
    type Agencies: AgencyRepository;
    type Plans: PlanRepository;
    type Validations: ValidationRepository;

    fn bins(&self) -> &Self::Bins;
    fn subtypes(&self) -> &Self::Subtypes;
    fn agencies(&self) -> &Self::Agencies;
    fn plans(&self) -> &Self::Plans;
    fn validations(&self) -> &Self::Validations;
    fn id_types(&self) -> &dyn IdTypeCatalog;
    fn audit_trail(&self) -> &dyn AuditTrail;
}

// ============================================================================
// LOCK HELPERS (shared by the in-memory registries)
// ============================================================================

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> CatalogResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| CatalogError::Storage("registry lock poisoned".to_string()))
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> CatalogResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| CatalogError::Storage("registry lock poisoned".to_string()))
}

pub(crate) fn matches_status(wanted: Option<Status>, actual: Status) -> bool {
    wanted.map_or(true, |s| s == actual)
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-memory owner id type catalog + event log
#[derive(Clone, Default)]
pub struct MemoryLedger {
    id_types: Arc<RwLock<Vec<String>>>,
    events: Arc<RwLock<Vec<Event>>>,
}

impl MemoryLedger {
    pub fn register_id_type(&self, code: &str) -> CatalogResult<()> {
        let mut id_types = write_lock(&self.id_types)?;
        if !id_types.iter().any(|c| c == code) {
            id_types.push(code.to_string());
        }
        Ok(())
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> CatalogResult<Vec<Event>> {
        let events = read_lock(&self.events)?;
        Ok(events
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    pub fn event_count(&self) -> CatalogResult<usize> {
        Ok(read_lock(&self.events)?.len())
    }
}

impl IdTypeCatalog for MemoryLedger {
    fn id_type_codes(&self) -> CatalogResult<Vec<String>> {
        Ok(read_lock(&self.id_types)?.clone())
    }
}

impl AuditTrail for MemoryLedger {
    fn record_event(&self, event: &Event) -> CatalogResult<()> {
        write_lock(&self.events)?.push(event.clone());
        Ok(())
    }
}

/// All registries in memory. Cloning shares the underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub bins: BinRegistry,
    pub subtypes: SubtypeRegistry,
    pub agencies: AgencyRegistry,
    pub plans: PlanRegistry,
    pub validations: ValidationRegistry,
    pub ledger: MemoryLedger,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with owner identification types
    pub fn with_id_types(codes: &[&str]) -> CatalogResult<Self> {
        let store = Self::new();
        for code in codes {
            store.ledger.register_id_type(code)?;
        }
        Ok(store)
    }
}

impl CatalogStore for MemoryStore {
    type Bins = BinRegistry;
    type Subtypes = SubtypeRegistry;
    type Agencies = AgencyRegistry;
    type Plans = PlanRegistry;
    type Validations = ValidationRegistry;

    fn bins(&self) -> &BinRegistry {
        &self.bins
    }

    fn subtypes(&self) -> &SubtypeRegistry {
        &self.subtypes
    }

    fn agencies(&self) -> &AgencyRegistry {
        &self.agencies
    }

    fn plans(&self) -> &PlanRegistry {
        &self.plans
    }

    fn validations(&self) -> &ValidationRegistry {
        &self.validations
    }

    fn id_types(&self) -> &dyn IdTypeCatalog {
        &self.ledger
    }

    fn audit_trail(&self) -> &dyn AuditTrail {
        &self.ledger
    }
}

// ============================================================================
// TESTS
// ============================================================================
