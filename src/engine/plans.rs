// Commerce plans, their items and subtype links

use super::{require_actor, CatalogEngine};
use crate::audit::Audited;
use crate::commands::{optional, required, NewPlan, PlanChanges};
use crate::entities::{CommercePlan, PlanItem, SubtypePlanLink, ValidationMode};
use crate::error::{CatalogError, CatalogResult};
use crate::invariants;
use crate::plan_items::{admit_bulk, BulkAddSummary};
use crate::status::{Status, StatusGuard};
use crate::store::{CatalogStore, Page, PlanRepository};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl<'a, S: CatalogStore> CatalogEngine<'a, S> {
    // ========================================================================
    // PLANS
    // ========================================================================

    pub fn create_plan(&self, cmd: &NewPlan, actor: &str) -> CatalogResult<CommercePlan> {
        let actor = require_actor(actor)?;
        let code = required("code", &cmd.code)?;
        let mode = ValidationMode::parse(&cmd.validation_mode)?;

        let mut plan = CommercePlan::new(code.clone(), optional(cmd.name.as_deref()), mode, actor);
        plan.plan_id = self.store.plans().insert_plan(&plan).inspect_err(|err| {
            warn!(plan_code = %code, error = %err, "plan rejected");
        })?;
        self.record("plan_created", "plan", &code, &plan, actor)?;

        info!(plan_code = %code, plan_id = plan.plan_id, mode = mode.as_str(), actor, "plan created");
        Ok(plan)
    }

    /// Rename and/or change mode. The store refuses a mode change while the
    /// plan has items.
    pub fn update_plan(
        &self,
        plan_code: &str,
        changes: &PlanChanges,
        actor: &str,
    ) -> CatalogResult<CommercePlan> {
        let actor = require_actor(actor)?;
        let mut plan = invariants::require_plan(self.store, plan_code)?;

        plan.validation_mode = ValidationMode::parse(&changes.validation_mode)?;
        plan.name = optional(changes.name.as_deref());
        plan.touch(actor);

        self.store.plans().update_plan(&plan).inspect_err(|err| {
            warn!(plan_code, error = %err, "plan update rejected");
        })?;
        self.record("plan_updated", "plan", plan_code, &plan, actor)?;

        info!(plan_code, mode = plan.validation_mode.as_str(), actor, "plan updated");
        Ok(plan)
    }

    pub fn change_plan_status(
        &self,
        plan_code: &str,
        new_status: &str,
        actor: &str,
    ) -> CatalogResult<CommercePlan> {
        let actor = require_actor(actor)?;
        let mut plan = invariants::require_plan(self.store, plan_code)?;

        let transition = StatusGuard::apply_unconditional(&mut plan, new_status)?;
        plan.touch(actor);
        self.store.plans().update_plan(&plan)?;
        self.record(
            "status_changed",
            "plan",
            plan_code,
            &json!({ "from": transition.from, "to": transition.to }),
            actor,
        )?;

        info!(plan_code, from = %transition.from, to = %transition.to, actor, "plan status changed");
        Ok(plan)
    }

    pub fn get_plan(&self, plan_code: &str) -> CatalogResult<CommercePlan> {
        invariants::require_plan(self.store, plan_code)
    }

    pub fn list_plans(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<CommercePlan>> {
        self.store.plans().list_plans(status, self.page(page))
    }

    // ========================================================================
    // ITEMS
    // ========================================================================

    /// Add one item; fails on the first problem
    pub fn add_plan_item(&self, plan_code: &str, raw_value: &str, actor: &str) -> CatalogResult<PlanItem> {
        let actor = require_actor(actor)?;
        let plan = invariants::require_plan(self.store, plan_code)?;
        let value = raw_value.trim();

        self.settings
            .item_format
            .check(plan.validation_mode, value)
            .inspect_err(|err| {
                warn!(plan_code, value, error = %err, "plan item rejected");
            })?;

        if self
            .store
            .plans()
            .plan_item_values(plan.plan_id)?
            .iter()
            .any(|v| v == value)
        {
            warn!(plan_code, value, "duplicate plan item");
            return Err(CatalogError::invalid(format!(
                "item {} already exists in plan {}",
                value, plan_code
            )));
        }

        let mut item = PlanItem::new(plan.plan_id, value.to_string(), actor);
        item.plan_item_id = self.store.plans().insert_plan_item(&item)?;
        self.record(
            "plan_item_added",
            "plan_item",
            &item.plan_item_id.to_string(),
            &json!({ "plan": plan_code, "item": item }),
            actor,
        )?;

        info!(plan_code, value, plan_item_id = item.plan_item_id, actor, "plan item added");
        Ok(item)
    }

    /// Add many items at once. Never partially fails: every value ends up in
    /// the summary as inserted, duplicate or invalid.
    pub fn bulk_add_plan_items(
        &self,
        plan_code: &str,
        raw_values: &[String],
        actor: &str,
    ) -> CatalogResult<BulkAddSummary> {
        let actor = require_actor(actor)?;
        let plan = invariants::require_plan(self.store, plan_code)?;

        let existing: HashSet<String> = self
            .store
            .plans()
            .plan_item_values(plan.plan_id)?
            .into_iter()
            .collect();
        let admission = admit_bulk(
            &self.settings.item_format,
            plan.validation_mode,
            raw_values,
            &existing,
        )
        .inspect_err(|err| {
            warn!(plan_code, error = %err, "bulk add rejected");
        })?;

        for value in &admission.accepted {
            let mut item = PlanItem::new(plan.plan_id, value.clone(), actor);
            item.plan_item_id = self.store.plans().insert_plan_item(&item)?;
            self.record(
                "plan_item_added",
                "plan_item",
                &item.plan_item_id.to_string(),
                &json!({ "plan": plan_code, "item": item }),
                actor,
            )?;
            debug!(plan_code, value = %value, "plan item inserted");
        }
        self.record("plan_items_bulk_added", "plan", plan_code, &admission.summary, actor)?;

        info!(plan_code, actor, "{}", admission.summary.summary());
        Ok(admission.summary)
    }

    pub fn change_plan_item_status(
        &self,
        plan_code: &str,
        plan_item_id: i64,
        new_status: &str,
        actor: &str,
    ) -> CatalogResult<PlanItem> {
        let actor = require_actor(actor)?;
        let plan = invariants::require_plan(self.store, plan_code)?;
        let mut item = self
            .store
            .plans()
            .find_plan_item(plan_item_id)?
            .filter(|item| item.plan_id == plan.plan_id)
            .ok_or(CatalogError::PlanItemNotFound(plan_item_id))?;

        let transition = StatusGuard::apply_unconditional(&mut item, new_status)?;
        item.touch(actor);
        self.store.plans().update_plan_item(&item)?;
        self.record(
            "status_changed",
            "plan_item",
            &plan_item_id.to_string(),
            &json!({ "plan": plan_code, "from": transition.from, "to": transition.to }),
            actor,
        )?;

        info!(plan_code, plan_item_id, to = %transition.to, actor, "plan item status changed");
        Ok(item)
    }

    pub fn list_plan_items(
        &self,
        plan_code: &str,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<PlanItem>> {
        let plan = invariants::require_plan(self.store, plan_code)?;
        self.store
            .plans()
            .list_plan_items(plan.plan_id, status, self.page(page))
    }

    // ========================================================================
    // SUBTYPE LINKS
    // ========================================================================

    /// Link a plan to a subtype, replacing any previous link
    pub fn assign_plan(
        &self,
        subtype_code: &str,
        plan_code: &str,
        actor: &str,
    ) -> CatalogResult<SubtypePlanLink> {
        let actor = require_actor(actor)?;
        invariants::require_subtype(self.store, subtype_code)?;
        let plan = invariants::require_plan(self.store, plan_code)?;

        invariants::plan_assignable(self.store, &plan).inspect_err(|err| {
            warn!(subtype_code, plan_code, error = %err, "plan assignment rejected");
        })?;

        let link = match self.store.plans().find_plan_link(subtype_code)? {
            Some(mut link) => {
                link.plan_id = plan.plan_id;
                link.status = Status::Active;
                link.touch(actor);
                link
            }
            None => SubtypePlanLink::new(subtype_code.to_string(), plan.plan_id, actor),
        };
        self.store.plans().save_plan_link(&link)?;
        self.record(
            "plan_assigned",
            "subtype",
            subtype_code,
            &json!({ "plan": plan_code, "plan_id": plan.plan_id }),
            actor,
        )?;

        info!(subtype_code, plan_code, actor, "plan assigned");
        Ok(link)
    }

    /// Deactivate the subtype's plan link
    pub fn unassign_plan(&self, subtype_code: &str, actor: &str) -> CatalogResult<SubtypePlanLink> {
        let actor = require_actor(actor)?;
        invariants::require_subtype(self.store, subtype_code)?;

        let mut link = self
            .store
            .plans()
            .find_plan_link(subtype_code)?
            .ok_or_else(|| CatalogError::PlanNotFound(format!("linked to subtype {}", subtype_code)))?;

        StatusGuard::apply_unconditional(&mut link, Status::Inactive.as_str())?;
        link.touch(actor);
        self.store.plans().save_plan_link(&link)?;
        self.record(
            "plan_unassigned",
            "subtype",
            subtype_code,
            &json!({ "plan_id": link.plan_id }),
            actor,
        )?;

        info!(subtype_code, actor, "plan unassigned");
        Ok(link)
    }

    /// The plan actively linked to a subtype, if any
    pub fn get_subtype_plan(&self, subtype_code: &str) -> CatalogResult<Option<CommercePlan>> {
        invariants::require_subtype(self.store, subtype_code)?;

        match self.store.plans().find_plan_link(subtype_code)? {
            Some(link) if link.status.is_active() => self.store.plans().find_plan(link.plan_id),
            _ => Ok(None),
        }
    }
}
