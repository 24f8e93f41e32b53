// ⚙️ Catalog Engine - One operation per verb
//
// The engine borrows a store for a single unit of work (usually one database
// transaction), loads the aggregates it needs, runs key derivation / value
// coercion, checks the cross-entity invariants, applies the status guard and
// writes the result. It keeps no state between calls.
//
// Operations are split by aggregate:
// - bins.rs        BIN lifecycle
// - subtypes.rs    subtype lifecycle, key derivation, activation gate
// - agencies.rs    agencies, keep-one-active gate
// - plans.rs       commerce plans, items, subtype links
// - rules.rs       validations and their per-subtype values

mod agencies;
mod bins;
mod plans;
mod rules;
mod subtypes;

use crate::audit::Event;
use crate::error::{CatalogError, CatalogResult};
use crate::plan_items::ItemFormat;
use crate::store::{CatalogStore, Page, DEFAULT_PAGE_LIMIT};
use serde::Serialize;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub item_format: ItemFormat,
    pub page_limit_max: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            item_format: ItemFormat::default(),
            page_limit_max: DEFAULT_PAGE_LIMIT * 10,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct CatalogEngine<'a, S: CatalogStore> {
    store: &'a S,
    settings: EngineSettings,
}

impl<'a, S: CatalogStore> CatalogEngine<'a, S> {
    pub fn new(store: &'a S, settings: EngineSettings) -> Self {
        CatalogEngine { store, settings }
    }

    pub fn store(&self) -> &S {
        self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn page(&self, page: Page) -> Page {
        page.clamp(self.settings.page_limit_max)
    }

    /// Append to the audit trail
    fn record<T: Serialize>(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: &T,
        actor: &str,
    ) -> CatalogResult<()> {
        let event = Event::new(
            event_type,
            entity_type,
            entity_id,
            serde_json::to_value(data)?,
            actor,
        );
        self.store.audit_trail().record_event(&event)
    }
}

/// Every mutation needs a non-blank actor
fn require_actor(actor: &str) -> CatalogResult<&str> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(CatalogError::invalid("actor is required"));
    }
    Ok(actor)
}
