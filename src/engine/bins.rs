// BIN lifecycle

use super::{require_actor, CatalogEngine};
use crate::audit::Audited;
use crate::commands::{optional, parse_yes_no, BinChanges, NewBin};
use crate::entities::Bin;
use crate::error::CatalogResult;
use crate::invariants;
use crate::key_derivation::{validate_bin_number, validate_extension_config};
use crate::status::{Status, StatusGuard};
use crate::store::{BinRepository, CatalogStore, Page};
use serde_json::json;
use tracing::{info, warn};

impl<'a, S: CatalogStore> CatalogEngine<'a, S> {
    pub fn create_bin(&self, cmd: &NewBin, actor: &str) -> CatalogResult<Bin> {
        let actor = require_actor(actor)?;
        let number = cmd.bin.trim();

        validate_bin_number(number)?;
        let uses_extension = parse_yes_no("usesExtension", &cmd.uses_extension)?;
        let digits = validate_extension_config(number, uses_extension, cmd.extension_digits)?;

        invariants::ensure_bin_available(self.store, number).inspect_err(|err| {
            warn!(bin = number, error = %err, "BIN rejected");
        })?;

        let bin = Bin::new(
            number.to_string(),
            uses_extension,
            digits,
            optional(cmd.description.as_deref()),
            actor,
        );
        self.store.bins().insert_bin(&bin)?;
        self.record("bin_created", "bin", &bin.bin, &bin, actor)?;

        info!(bin = %bin.bin, uses_extension, actor, "BIN created");
        Ok(bin)
    }

    /// Edit description and extension config. The extension config is frozen
    /// while subtypes exist under the BIN.
    pub fn update_bin(&self, bin: &str, changes: &BinChanges, actor: &str) -> CatalogResult<Bin> {
        let actor = require_actor(actor)?;
        let mut current = invariants::require_bin(self.store, bin)?;

        let uses_extension = parse_yes_no("usesExtension", &changes.uses_extension)?;
        let digits = validate_extension_config(&current.bin, uses_extension, changes.extension_digits)?;

        if uses_extension != current.uses_extension || digits != current.extension_digits {
            invariants::extension_config_unlocked(self.store, &current).inspect_err(|err| {
                warn!(bin, error = %err, "BIN extension change rejected");
            })?;
        }

        current.uses_extension = uses_extension;
        current.extension_digits = digits;
        current.description = optional(changes.description.as_deref());
        current.touch(actor);

        self.store.bins().update_bin(&current)?;
        self.record("bin_updated", "bin", &current.bin, &current, actor)?;

        info!(bin, actor, "BIN updated");
        Ok(current)
    }

    pub fn change_bin_status(&self, bin: &str, new_status: &str, actor: &str) -> CatalogResult<Bin> {
        let actor = require_actor(actor)?;
        let mut current = invariants::require_bin(self.store, bin)?;

        let transition = StatusGuard::apply_unconditional(&mut current, new_status)?;
        current.touch(actor);

        self.store.bins().update_bin(&current)?;
        self.record(
            "status_changed",
            "bin",
            bin,
            &json!({ "from": transition.from, "to": transition.to }),
            actor,
        )?;

        info!(bin, from = %transition.from, to = %transition.to, actor, "BIN status changed");
        Ok(current)
    }

    pub fn get_bin(&self, bin: &str) -> CatalogResult<Bin> {
        invariants::require_bin(self.store, bin)
    }

    pub fn list_bins(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<Bin>> {
        self.store.bins().list_bins(status, self.page(page))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::commands::BinChanges;
    use crate::error::{CatalogError, ErrorKind};
    use crate::status::Status;
    use crate::store::Page;

    #[test]
    fn test_create_bin() {
        let store = store();
        let engine = engine(&store);

        let bin = engine.create_bin(&new_bin("123456", "Y", Some(3)), ACTOR).unwrap();
        assert!(bin.uses_extension);
        assert_eq!(bin.extension_digits, Some(3));
        assert_eq!(bin.status, Status::Active);
        assert_eq!(bin.audit.updated_by, ACTOR);

        assert_eq!(store.ledger.events_for("bin", "123456").unwrap().len(), 1);
    }

    #[test]
    fn test_create_bin_validation() {
        let store = store();
        let engine = engine(&store);

        for cmd in [
            new_bin("12345", "N", None),
            new_bin("123456", "maybe", None),
            new_bin("123456789", "Y", Some(1)),
            new_bin("123456", "Y", Some(4)),
            new_bin("123456", "Y", None),
        ] {
            let err = engine.create_bin(&cmd, ACTOR).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidData, "{:?}", cmd);
        }

        assert!(engine.create_bin(&new_bin("123456", "N", None), " ").is_err());
    }

    #[test]
    fn test_create_bin_duplicate() {
        let store = store();
        let engine = engine(&store);
        engine.create_bin(&new_bin("123456", "N", None), ACTOR).unwrap();

        let err = engine.create_bin(&new_bin("123456", "N", None), ACTOR).unwrap_err();
        assert_eq!(err, CatalogError::BinAlreadyExists("123456".into()));
    }

    #[test]
    fn test_create_bin_colliding_with_subtype_key() {
        let store = seeded();
        let engine = engine(&store);

        let err = engine
            .create_bin(&new_bin("123456007", "N", None), ACTOR)
            .unwrap_err();
        assert!(matches!(err, CatalogError::BinAlreadyExists(_)));
    }

    #[test]
    fn test_update_bin_extension_locked_by_subtypes() {
        let store = seeded();
        let engine = engine(&store);

        let changes = BinChanges {
            uses_extension: "Y".into(),
            extension_digits: Some(2),
            description: None,
        };
        let err = engine.update_bin("123456", &changes, ACTOR).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictRule);

        // description-only edits are fine
        let changes = BinChanges {
            uses_extension: "Y".into(),
            extension_digits: Some(3),
            description: Some("Classic".into()),
        };
        let bin = engine.update_bin("123456", &changes, ACTOR).unwrap();
        assert_eq!(bin.description.as_deref(), Some("Classic"));
    }

    #[test]
    fn test_update_bin_without_subtypes() {
        let store = store();
        let engine = engine(&store);
        engine.create_bin(&new_bin("123456", "N", None), ACTOR).unwrap();

        let changes = BinChanges {
            uses_extension: "Y".into(),
            extension_digits: Some(2),
            description: None,
        };
        let bin = engine.update_bin("123456", &changes, "other").unwrap();
        assert_eq!(bin.extension_digits, Some(2));
        assert_eq!(bin.audit.updated_by, "other");
        assert!(bin.audit.created_at <= bin.audit.updated_at);
    }

    #[test]
    fn test_change_bin_status() {
        let store = store();
        let engine = engine(&store);
        engine.create_bin(&new_bin("123456", "N", None), ACTOR).unwrap();

        let bin = engine.change_bin_status("123456", "I", ACTOR).unwrap();
        assert_eq!(bin.status, Status::Inactive);

        // same-state transition is a no-op save
        let bin = engine.change_bin_status("123456", "I", "second").unwrap();
        assert_eq!(bin.status, Status::Inactive);
        assert_eq!(bin.audit.updated_by, "second");

        assert_eq!(
            engine.change_bin_status("123456", "X", ACTOR).unwrap_err().kind(),
            ErrorKind::InvalidData
        );
        assert_eq!(
            engine.change_bin_status("999999", "A", ACTOR).unwrap_err(),
            CatalogError::BinNotFound("999999".into())
        );
    }

    #[test]
    fn test_list_bins() {
        let store = store();
        let engine = engine(&store);
        for bin in ["222222", "111111", "33333333"] {
            engine.create_bin(&new_bin(bin, "N", None), ACTOR).unwrap();
        }
        engine.change_bin_status("222222", "I", ACTOR).unwrap();

        let active = engine.list_bins(Some(Status::Active), Page::default()).unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(engine.list_bins(None, Page::new(0, 1)).unwrap().len(), 1);
    }
}
