// 🛒 Commerce Plan Entity - Permitted MCCs or merchant ids for a subtype
//
// A plan's validation_mode decides what its items look like:
// - MCC          → 4-digit merchant category codes
// - MERCHANT_ID  → fixed-width numeric merchant identifiers
// - UNIQUE       → no items at all
//
// The mode is locked once the plan has items.

use crate::audit::Audit;
use crate::error::{CatalogError, CatalogResult};
use crate::status::Status;
use crate::store::{matches_status, read_lock, write_lock, Page, PlanRepository};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

// ============================================================================
// VALIDATION MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationMode {
    #[serde(rename = "UNIQUE")]
    Unique,
    #[serde(rename = "MCC")]
    Mcc,
    #[serde(rename = "MERCHANT_ID")]
    MerchantId,
}

impl ValidationMode {
    pub fn parse(raw: &str) -> CatalogResult<ValidationMode> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "UNIQUE" => Ok(ValidationMode::Unique),
            "MCC" => Ok(ValidationMode::Mcc),
            "MERCHANT_ID" => Ok(ValidationMode::MerchantId),
            other => Err(CatalogError::invalid(format!(
                "validation mode must be UNIQUE, MCC or MERCHANT_ID, got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Unique => "UNIQUE",
            ValidationMode::Mcc => "MCC",
            ValidationMode::MerchantId => "MERCHANT_ID",
        }
    }
}

// ============================================================================
// COMMERCE PLAN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommercePlan {
    /// Surrogate key, assigned by the store (0 until inserted)
    pub plan_id: i64,
    pub code: String,
    pub name: Option<String>,
    pub validation_mode: ValidationMode,
    pub status: Status,

    #[serde(flatten)]
    pub audit: Audit,
}

impl CommercePlan {
    pub fn new(code: String, name: Option<String>, validation_mode: ValidationMode, actor: &str) -> Self {
        CommercePlan {
            plan_id: 0,
            code,
            name,
            validation_mode,
            status: Status::Active,
            audit: Audit::new(actor),
        }
    }
}

// ============================================================================
// PLAN ITEM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub plan_item_id: i64,
    pub plan_id: i64,
    /// MCC or merchant id, depending on the plan's mode
    pub value: String,
    pub status: Status,

    #[serde(flatten)]
    pub audit: Audit,
}

impl PlanItem {
    pub fn new(plan_id: i64, value: String, actor: &str) -> Self {
        PlanItem {
            plan_item_id: 0,
            plan_id,
            value,
            status: Status::Active,
            audit: Audit::new(actor),
        }
    }
}

// ============================================================================
// SUBTYPE ↔ PLAN LINK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypePlanLink {
    pub subtype_code: String,
    pub plan_id: i64,
    pub status: Status,

    #[serde(flatten)]
    pub audit: Audit,
}

impl SubtypePlanLink {
    pub fn new(subtype_code: String, plan_id: i64, actor: &str) -> Self {
        SubtypePlanLink {
            subtype_code,
            plan_id,
            status: Status::Active,
            audit: Audit::new(actor),
        }
    }
}

stateful_audited!(CommercePlan, PlanItem, SubtypePlanLink);

// ============================================================================
// PLAN REGISTRY
// ============================================================================

#[derive(Default)]
struct PlanTables {
    plans: Vec<CommercePlan>,
    items: Vec<PlanItem>,
    links: Vec<SubtypePlanLink>,
    next_plan_id: i64,
    next_item_id: i64,
}

/// In-memory plans, items and subtype links
#[derive(Clone, Default)]
pub struct PlanRegistry {
    tables: Arc<RwLock<PlanTables>>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanRepository for PlanRegistry {
    fn find_plan(&self, plan_id: i64) -> CatalogResult<Option<CommercePlan>> {
        let tables = read_lock(&self.tables)?;
        Ok(tables.plans.iter().find(|p| p.plan_id == plan_id).cloned())
    }

    fn find_plan_by_code(&self, code: &str) -> CatalogResult<Option<CommercePlan>> {
        let tables = read_lock(&self.tables)?;
        Ok(tables.plans.iter().find(|p| p.code == code).cloned())
    }

    fn insert_plan(&self, plan: &CommercePlan) -> CatalogResult<i64> {
        let mut tables = write_lock(&self.tables)?;
        if tables.plans.iter().any(|p| p.code == plan.code) {
            return Err(CatalogError::PlanAlreadyExists(plan.code.clone()));
        }
        tables.next_plan_id += 1;
        let mut stored = plan.clone();
        stored.plan_id = tables.next_plan_id;
        tables.plans.push(stored);
        Ok(tables.next_plan_id)
    }

    fn update_plan(&self, plan: &CommercePlan) -> CatalogResult<()> {
        let mut tables = write_lock(&self.tables)?;
        let has_items = tables.items.iter().any(|i| i.plan_id == plan.plan_id);
        let existing = tables
            .plans
            .iter_mut()
            .find(|p| p.plan_id == plan.plan_id)
            .ok_or_else(|| CatalogError::PlanNotFound(plan.code.clone()))?;

        if existing.validation_mode != plan.validation_mode && has_items {
            return Err(CatalogError::invalid(format!(
                "validation mode of plan {} is locked while it has items",
                plan.code
            )));
        }
        *existing = plan.clone();
        Ok(())
    }

    fn list_plans(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<CommercePlan>> {
        let tables = read_lock(&self.tables)?;
        let mut matching: Vec<CommercePlan> = tables
            .plans
            .iter()
            .filter(|p| matches_status(status, p.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(page.slice(matching))
    }

    fn find_plan_item(&self, plan_item_id: i64) -> CatalogResult<Option<PlanItem>> {
        let tables = read_lock(&self.tables)?;
        Ok(tables
            .items
            .iter()
            .find(|i| i.plan_item_id == plan_item_id)
            .cloned())
    }

    fn plan_item_values(&self, plan_id: i64) -> CatalogResult<Vec<String>> {
        let tables = read_lock(&self.tables)?;
        Ok(tables
            .items
            .iter()
            .filter(|i| i.plan_id == plan_id)
            .map(|i| i.value.clone())
            .collect())
    }

    fn count_plan_items(&self, plan_id: i64, status: Option<Status>) -> CatalogResult<usize> {
        let tables = read_lock(&self.tables)?;
        Ok(tables
            .items
            .iter()
            .filter(|i| i.plan_id == plan_id && matches_status(status, i.status))
            .count())
    }

    fn insert_plan_item(&self, item: &PlanItem) -> CatalogResult<i64> {
        let mut tables = write_lock(&self.tables)?;
        if tables
            .items
            .iter()
            .any(|i| i.plan_id == item.plan_id && i.value == item.value)
        {
            return Err(CatalogError::invalid(format!(
                "item {} already exists in plan",
                item.value
            )));
        }
        tables.next_item_id += 1;
        let mut stored = item.clone();
        stored.plan_item_id = tables.next_item_id;
        tables.items.push(stored);
        Ok(tables.next_item_id)
    }

    fn update_plan_item(&self, item: &PlanItem) -> CatalogResult<()> {
        let mut tables = write_lock(&self.tables)?;
        match tables
            .items
            .iter_mut()
            .find(|i| i.plan_item_id == item.plan_item_id)
        {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(CatalogError::PlanItemNotFound(item.plan_item_id)),
        }
    }

    fn list_plan_items(
        &self,
        plan_id: i64,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<PlanItem>> {
        let tables = read_lock(&self.tables)?;
        let mut matching: Vec<PlanItem> = tables
            .items
            .iter()
            .filter(|i| i.plan_id == plan_id && matches_status(status, i.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.value.cmp(&b.value));
        Ok(page.slice(matching))
    }

    fn find_plan_link(&self, subtype_code: &str) -> CatalogResult<Option<SubtypePlanLink>> {
        let tables = read_lock(&self.tables)?;
        Ok(tables
            .links
            .iter()
            .find(|l| l.subtype_code == subtype_code)
            .cloned())
    }

    fn save_plan_link(&self, link: &SubtypePlanLink) -> CatalogResult<()> {
        let mut tables = write_lock(&self.tables)?;
        match tables
            .links
            .iter_mut()
            .find(|l| l.subtype_code == link.subtype_code)
        {
            Some(existing) => *existing = link.clone(),
            None => tables.links.push(link.clone()),
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(ValidationMode::parse("mcc").unwrap(), ValidationMode::Mcc);
        assert_eq!(
            ValidationMode::parse(" MERCHANT_ID ").unwrap(),
            ValidationMode::MerchantId
        );
        assert_eq!(ValidationMode::parse("UNIQUE").unwrap(), ValidationMode::Unique);
        assert!(ValidationMode::parse("BOTH").is_err());
    }

    #[test]
    fn test_plan_ids_are_assigned() {
        let registry = PlanRegistry::new();
        let a = registry
            .insert_plan(&CommercePlan::new("P1".into(), None, ValidationMode::Mcc, "t"))
            .unwrap();
        let b = registry
            .insert_plan(&CommercePlan::new("P2".into(), None, ValidationMode::Mcc, "t"))
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.find_plan(b).unwrap().unwrap().code, "P2");

        let dup = registry
            .insert_plan(&CommercePlan::new("P1".into(), None, ValidationMode::Unique, "t"))
            .unwrap_err();
        assert_eq!(dup, CatalogError::PlanAlreadyExists("P1".into()));
    }

    #[test]
    fn test_mode_locked_once_items_exist() {
        let registry = PlanRegistry::new();
        let id = registry
            .insert_plan(&CommercePlan::new("P1".into(), None, ValidationMode::Mcc, "t"))
            .unwrap();
        let mut plan = registry.find_plan(id).unwrap().unwrap();

        // no items yet: mode can change
        plan.validation_mode = ValidationMode::MerchantId;
        registry.update_plan(&plan).unwrap();

        registry
            .insert_plan_item(&PlanItem::new(id, "123456789012345".into(), "t"))
            .unwrap();

        plan.validation_mode = ValidationMode::Mcc;
        let err = registry.update_plan(&plan).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidData);

        // other edits still go through
        plan.validation_mode = ValidationMode::MerchantId;
        plan.name = Some("Fuel".into());
        registry.update_plan(&plan).unwrap();
    }

    #[test]
    fn test_item_counts_by_status() {
        let registry = PlanRegistry::new();
        let id = registry
            .insert_plan(&CommercePlan::new("P1".into(), None, ValidationMode::Mcc, "t"))
            .unwrap();
        let item_id = registry
            .insert_plan_item(&PlanItem::new(id, "1234".into(), "t"))
            .unwrap();
        registry
            .insert_plan_item(&PlanItem::new(id, "5411".into(), "t"))
            .unwrap();

        let mut item = registry.find_plan_item(item_id).unwrap().unwrap();
        item.status = Status::Inactive;
        registry.update_plan_item(&item).unwrap();

        assert_eq!(registry.count_plan_items(id, None).unwrap(), 2);
        assert_eq!(registry.count_plan_items(id, Some(Status::Active)).unwrap(), 1);
        assert_eq!(registry.plan_item_values(id).unwrap().len(), 2);
    }

    #[test]
    fn test_link_upsert_keeps_one_per_subtype() {
        let registry = PlanRegistry::new();
        registry
            .save_plan_link(&SubtypePlanLink::new("SUB".into(), 1, "t"))
            .unwrap();
        registry
            .save_plan_link(&SubtypePlanLink::new("SUB".into(), 2, "t"))
            .unwrap();

        let link = registry.find_plan_link("SUB").unwrap().unwrap();
        assert_eq!(link.plan_id, 2);
    }
}
