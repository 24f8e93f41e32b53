// Subtype lifecycle
//
// Order of checks on create/update:
//   1. BIN exists (its extension config drives key derivation)
//   2. extension normalized, effective key derived
//   3. owner id type known
//   4. (bin, code) unique and code not reused under another BIN
//   5. effective key collides with no master BIN and no other subtype

use super::{require_actor, CatalogEngine};
use crate::audit::Audited;
use crate::commands::{optional, required, NewSubtype, SubtypeChanges};
use crate::entities::{Bin, Subtype};
use crate::error::CatalogResult;
use crate::invariants;
use crate::key_derivation::{derived_key_for, normalize_extension};
use crate::status::{no_precondition, Status, StatusGuard};
use crate::store::{CatalogStore, Page, SubtypeRepository, ValidationRepository};
use serde_json::json;
use tracing::{info, warn};

impl<'a, S: CatalogStore> CatalogEngine<'a, S> {
    pub fn create_subtype(&self, cmd: &NewSubtype, actor: &str) -> CatalogResult<Subtype> {
        let actor = require_actor(actor)?;
        let bin_number = required("bin", &cmd.bin)?;
        let subtype_code = required("subtypeCode", &cmd.subtype_code)?;

        let bin = invariants::require_bin(self.store, &bin_number)?;

        let mut subtype = Subtype::new(bin.bin.clone(), subtype_code.clone(), actor);
        subtype.name = optional(cmd.name.as_deref());
        self.derive_key(&mut subtype, &bin, cmd.extension.as_deref())?;
        self.apply_owner(
            &mut subtype,
            cmd.owner_id_type.as_deref(),
            cmd.owner_id_number.as_deref(),
        )?;

        invariants::ensure_subtype_code_available(self.store, &bin.bin, &subtype_code)
            .and_then(|_| invariants::ensure_effective_key_free(self.store, &subtype))
            .inspect_err(|err| {
                warn!(bin = %bin.bin, subtype_code = %subtype_code, error = %err, "subtype rejected");
            })?;

        self.store.subtypes().insert_subtype(&subtype)?;
        self.record("subtype_created", "subtype", &subtype_code, &subtype, actor)?;

        info!(
            bin = %subtype.bin,
            subtype_code = %subtype.subtype_code,
            effective_key = ?subtype.effective_key,
            actor,
            "subtype created"
        );
        Ok(subtype)
    }

    /// Replace name, extension and owner fields; the effective key is recomputed
    pub fn update_subtype(
        &self,
        subtype_code: &str,
        changes: &SubtypeChanges,
        actor: &str,
    ) -> CatalogResult<Subtype> {
        let actor = require_actor(actor)?;
        let mut subtype = invariants::require_subtype(self.store, subtype_code)?;
        let bin = invariants::require_bin(self.store, &subtype.bin)?;
        let previous_bin = subtype.addressable_bin().to_string();

        subtype.name = optional(changes.name.as_deref());
        self.derive_key(&mut subtype, &bin, changes.extension.as_deref())?;
        self.apply_owner(
            &mut subtype,
            changes.owner_id_type.as_deref(),
            changes.owner_id_number.as_deref(),
        )?;

        invariants::ensure_effective_key_free(self.store, &subtype).inspect_err(|err| {
            warn!(subtype_code, error = %err, "subtype update rejected");
        })?;

        subtype.touch(actor);
        self.store.subtypes().update_subtype(&subtype)?;

        // Rule maps follow the subtype to its new key
        let moved_rules = if previous_bin != subtype.addressable_bin() {
            self.store.validations().rekey_validation_maps(
                subtype_code,
                &previous_bin,
                subtype.addressable_bin(),
            )?
        } else {
            0
        };
        self.record("subtype_updated", "subtype", subtype_code, &subtype, actor)?;

        info!(
            subtype_code,
            effective_key = ?subtype.effective_key,
            moved_rules,
            actor,
            "subtype updated"
        );
        Ok(subtype)
    }

    /// Activation requires an active agency under the subtype
    pub fn change_subtype_status(
        &self,
        subtype_code: &str,
        new_status: &str,
        actor: &str,
    ) -> CatalogResult<Subtype> {
        let actor = require_actor(actor)?;
        let mut subtype = invariants::require_subtype(self.store, subtype_code)?;

        let transition = StatusGuard::apply(
            &mut subtype,
            new_status,
            || invariants::activation_requires_agency(self.store, subtype_code),
            no_precondition,
        )
        .inspect_err(|err| {
            warn!(subtype_code, new_status, error = %err, "subtype status change rejected");
        })?;

        subtype.touch(actor);
        self.store.subtypes().update_subtype(&subtype)?;
        self.record(
            "status_changed",
            "subtype",
            subtype_code,
            &json!({ "from": transition.from, "to": transition.to }),
            actor,
        )?;

        info!(subtype_code, from = %transition.from, to = %transition.to, actor, "subtype status changed");
        Ok(subtype)
    }

    pub fn get_subtype(&self, subtype_code: &str) -> CatalogResult<Subtype> {
        invariants::require_subtype(self.store, subtype_code)
    }

    pub fn list_subtypes(
        &self,
        bin: Option<&str>,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Subtype>> {
        self.store.subtypes().list_subtypes(bin, status, self.page(page))
    }

    fn derive_key(&self, subtype: &mut Subtype, bin: &Bin, raw_extension: Option<&str>) -> CatalogResult<()> {
        let extension = normalize_extension(
            &bin.bin,
            raw_extension,
            bin.uses_extension,
            bin.extension_width(),
        )?;
        subtype.effective_key = derived_key_for(&bin.bin, extension.as_deref());
        subtype.extension = extension;
        Ok(())
    }

    fn apply_owner(
        &self,
        subtype: &mut Subtype,
        owner_id_type: Option<&str>,
        owner_id_number: Option<&str>,
    ) -> CatalogResult<()> {
        let owner_id_type = optional(owner_id_type);
        invariants::check_owner_id_type(self.store, owner_id_type.as_deref())?;
        subtype.owner_id_type = owner_id_type;
        subtype.owner_id_number = optional(owner_id_number);
        Ok(())
    }
}
