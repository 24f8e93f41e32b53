// Validations and their per-subtype values
//
// attach_rule check order:
//   1. value present
//   2. subtype exists, BIN addresses it
//   3. validation exists, active, inside its window
//   4. value coerces to the validation's data type
//   5. no mapping yet for (subtype, bin, validation)

use super::{require_actor, CatalogEngine};
use crate::audit::Audited;
use crate::coercion::{coerce, ensure_usable};
use crate::commands::{optional, required, NewValidation};
use crate::entities::{DataType, Validation, ValidationMap};
use crate::error::{CatalogError, CatalogResult};
use crate::invariants;
use crate::status::{Status, StatusGuard};
use crate::store::{CatalogStore, Page, ValidationRepository};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

impl<'a, S: CatalogStore> CatalogEngine<'a, S> {
    // ========================================================================
    // VALIDATIONS
    // ========================================================================

    pub fn create_validation(&self, cmd: &NewValidation, actor: &str) -> CatalogResult<Validation> {
        let actor = require_actor(actor)?;
        let code = required("code", &cmd.code)?;
        let data_type = DataType::parse(&cmd.data_type)?;

        if let (Some(from), Some(to)) = (cmd.valid_from, cmd.valid_to) {
            if from > to {
                return Err(CatalogError::invalid(format!(
                    "validFrom {} is after validTo {}",
                    from.to_rfc3339(),
                    to.to_rfc3339()
                )));
            }
        }

        let mut validation = Validation::new(code.clone(), data_type, actor);
        validation.description = optional(cmd.description.as_deref());
        validation.valid_from = cmd.valid_from;
        validation.valid_to = cmd.valid_to;

        validation.validation_id = self
            .store
            .validations()
            .insert_validation(&validation)
            .inspect_err(|err| {
                warn!(validation_code = %code, error = %err, "validation rejected");
            })?;
        self.record("validation_created", "validation", &code, &validation, actor)?;

        info!(validation_code = %code, data_type = data_type.as_str(), actor, "validation created");
        Ok(validation)
    }

    pub fn change_validation_status(
        &self,
        validation_code: &str,
        new_status: &str,
        actor: &str,
    ) -> CatalogResult<Validation> {
        let actor = require_actor(actor)?;
        let mut validation = invariants::require_validation(self.store, validation_code)?;

        let transition = StatusGuard::apply_unconditional(&mut validation, new_status)?;
        validation.touch(actor);
        self.store.validations().update_validation(&validation)?;
        self.record(
            "status_changed",
            "validation",
            validation_code,
            &json!({ "from": transition.from, "to": transition.to }),
            actor,
        )?;

        info!(validation_code, to = %transition.to, actor, "validation status changed");
        Ok(validation)
    }

    pub fn get_validation(&self, validation_code: &str) -> CatalogResult<Validation> {
        invariants::require_validation(self.store, validation_code)
    }

    pub fn list_validations(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<Validation>> {
        self.store.validations().list_validations(status, self.page(page))
    }

    // ========================================================================
    // RULE VALUES
    // ========================================================================

    /// Attach a validation value to a (subtype, BIN) pair. Never overwrites:
    /// an existing mapping fails `AlreadyExists`.
    pub fn attach_rule(
        &self,
        subtype_code: &str,
        bin: &str,
        validation_code: &str,
        raw_value: &Value,
        actor: &str,
    ) -> CatalogResult<ValidationMap> {
        let actor = require_actor(actor)?;
        if raw_value.is_null() {
            return Err(CatalogError::invalid("value is required"));
        }

        let subtype = invariants::require_subtype_pair(self.store, subtype_code, bin)?;
        let validation = invariants::require_validation(self.store, validation_code)?;
        let value = ensure_usable(&validation, Utc::now())
            .and_then(|_| coerce(validation.data_type, raw_value))
            .inspect_err(|err| {
                warn!(subtype_code, bin, validation_code, error = %err, "rule value rejected");
            })?;

        if self
            .store
            .validations()
            .find_validation_map(&subtype.subtype_code, bin, validation.validation_id)?
            .is_some()
        {
            warn!(subtype_code, bin, validation_code, "rule already attached");
            return Err(CatalogError::AlreadyExists {
                subtype_code: subtype.subtype_code,
                bin: bin.to_string(),
                validation_code: validation.code,
            });
        }

        let map = ValidationMap::new(
            subtype.subtype_code.clone(),
            bin.to_string(),
            validation.validation_id,
            value,
            actor,
        );
        self.store.validations().insert_validation_map(&map)?;
        self.record(
            "rule_attached",
            "subtype",
            subtype_code,
            &json!({ "bin": bin, "validation": validation_code, "map": map }),
            actor,
        )?;

        info!(subtype_code, bin, validation_code, actor, "rule attached");
        Ok(map)
    }

    pub fn change_rule_status(
        &self,
        subtype_code: &str,
        bin: &str,
        validation_code: &str,
        new_status: &str,
        actor: &str,
    ) -> CatalogResult<ValidationMap> {
        let actor = require_actor(actor)?;
        invariants::require_subtype_pair(self.store, subtype_code, bin)?;
        let validation = invariants::require_validation(self.store, validation_code)?;
        let mut map = self.require_map(subtype_code, bin, &validation)?;

        let transition = StatusGuard::apply_unconditional(&mut map, new_status)?;
        map.touch(actor);
        self.store.validations().update_validation_map(&map)?;
        self.record(
            "status_changed",
            "subtype",
            subtype_code,
            &json!({
                "bin": bin,
                "validation": validation_code,
                "from": transition.from,
                "to": transition.to,
            }),
            actor,
        )?;

        info!(subtype_code, bin, validation_code, to = %transition.to, actor, "rule status changed");
        Ok(map)
    }

    /// Replace the value of an existing mapping, re-running coercion and the
    /// validation's usability checks
    pub fn update_rule_value(
        &self,
        subtype_code: &str,
        bin: &str,
        validation_code: &str,
        raw_value: &Value,
        actor: &str,
    ) -> CatalogResult<ValidationMap> {
        let actor = require_actor(actor)?;
        if raw_value.is_null() {
            return Err(CatalogError::invalid("value is required"));
        }

        invariants::require_subtype_pair(self.store, subtype_code, bin)?;
        let validation = invariants::require_validation(self.store, validation_code)?;
        let mut map = self.require_map(subtype_code, bin, &validation)?;
        let value = ensure_usable(&validation, Utc::now())
            .and_then(|_| coerce(validation.data_type, raw_value))
            .inspect_err(|err| {
                warn!(subtype_code, bin, validation_code, error = %err, "rule value rejected");
            })?;

        map.set_value(value);
        map.touch(actor);
        self.store.validations().update_validation_map(&map)?;
        self.record(
            "rule_value_updated",
            "subtype",
            subtype_code,
            &json!({ "bin": bin, "validation": validation_code, "map": map }),
            actor,
        )?;

        info!(subtype_code, bin, validation_code, actor, "rule value updated");
        Ok(map)
    }

    pub fn list_rules(
        &self,
        subtype_code: &str,
        bin: Option<&str>,
        page: Page,
    ) -> CatalogResult<Vec<ValidationMap>> {
        invariants::require_subtype(self.store, subtype_code)?;
        self.store
            .validations()
            .list_validation_maps(subtype_code, bin, self.page(page))
    }

    fn require_map(
        &self,
        subtype_code: &str,
        bin: &str,
        validation: &Validation,
    ) -> CatalogResult<ValidationMap> {
        self.store
            .validations()
            .find_validation_map(subtype_code, bin, validation.validation_id)?
            .ok_or_else(|| CatalogError::MapNotFound {
                subtype_code: subtype_code.to_string(),
                bin: bin.to_string(),
                validation_code: validation.code.clone(),
            })
    }
}
