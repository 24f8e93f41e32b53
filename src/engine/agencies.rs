// Agency lifecycle

use super::{require_actor, CatalogEngine};
use crate::audit::Audited;
use crate::commands::{optional, required, NewAgency};
use crate::entities::Agency;
use crate::error::{CatalogError, CatalogResult};
use crate::invariants;
use crate::status::{Status, StatusGuard};
use crate::store::{AgencyRepository, CatalogStore, Page};
use serde_json::json;
use tracing::{info, warn};

impl<'a, S: CatalogStore> CatalogEngine<'a, S> {
    /// New agencies start active under an existing subtype
    pub fn create_agency(&self, cmd: &NewAgency, actor: &str) -> CatalogResult<Agency> {
        let actor = require_actor(actor)?;
        let subtype_code = required("subtypeCode", &cmd.subtype_code)?;
        let agency_code = required("agencyCode", &cmd.agency_code)?;

        invariants::require_subtype(self.store, &subtype_code)?;

        let agency = Agency::new(
            subtype_code.clone(),
            agency_code.clone(),
            optional(cmd.name.as_deref()),
            actor,
        );
        self.store.agencies().insert_agency(&agency).inspect_err(|err| {
            warn!(subtype_code = %subtype_code, agency_code = %agency_code, error = %err, "agency rejected");
        })?;
        self.record(
            "agency_created",
            "agency",
            &agency_entity_id(&subtype_code, &agency_code),
            &agency,
            actor,
        )?;

        info!(subtype_code = %subtype_code, agency_code = %agency_code, actor, "agency created");
        Ok(agency)
    }

    pub fn update_agency(
        &self,
        subtype_code: &str,
        agency_code: &str,
        name: Option<&str>,
        actor: &str,
    ) -> CatalogResult<Agency> {
        let actor = require_actor(actor)?;
        let mut agency = self.require_agency(subtype_code, agency_code)?;

        agency.name = optional(name);
        agency.touch(actor);
        self.store.agencies().update_agency(&agency)?;
        self.record(
            "agency_updated",
            "agency",
            &agency_entity_id(subtype_code, agency_code),
            &agency,
            actor,
        )?;

        info!(subtype_code, agency_code, actor, "agency updated");
        Ok(agency)
    }

    /// Deactivation must leave another active agency under the subtype
    pub fn change_agency_status(
        &self,
        subtype_code: &str,
        agency_code: &str,
        new_status: &str,
        actor: &str,
    ) -> CatalogResult<Agency> {
        let actor = require_actor(actor)?;
        let mut agency = self.require_agency(subtype_code, agency_code)?;

        let transition = StatusGuard::apply(
            &mut agency,
            new_status,
            || invariants::require_subtype(self.store, subtype_code).map(|_| ()),
            || invariants::deactivation_keeps_agency(self.store, subtype_code, agency_code),
        )
        .inspect_err(|err| {
            warn!(subtype_code, agency_code, new_status, error = %err, "agency status change rejected");
        })?;

        agency.touch(actor);
        self.store.agencies().update_agency(&agency)?;
        self.record(
            "status_changed",
            "agency",
            &agency_entity_id(subtype_code, agency_code),
            &json!({ "from": transition.from, "to": transition.to }),
            actor,
        )?;

        info!(
            subtype_code,
            agency_code,
            from = %transition.from,
            to = %transition.to,
            actor,
            "agency status changed"
        );
        Ok(agency)
    }

    pub fn get_agency(&self, subtype_code: &str, agency_code: &str) -> CatalogResult<Agency> {
        self.require_agency(subtype_code, agency_code)
    }

    pub fn list_agencies(
        &self,
        subtype_code: &str,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Agency>> {
        invariants::require_subtype(self.store, subtype_code)?;
        self.store
            .agencies()
            .list_agencies(subtype_code, status, self.page(page))
    }

    fn require_agency(&self, subtype_code: &str, agency_code: &str) -> CatalogResult<Agency> {
        self.store
            .agencies()
            .find_agency(subtype_code, agency_code)?
            .ok_or_else(|| CatalogError::AgencyNotFound {
                subtype_code: subtype_code.to_string(),
                agency_code: agency_code.to_string(),
            })
    }
}

/// Event entity id for the composite agency key
fn agency_entity_id(subtype_code: &str, agency_code: &str) -> String {
    format!("{}/{}", subtype_code, agency_code)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::error::{CatalogError, ErrorKind};
    use crate::status::Status;
    use crate::store::Page;

    #[test]
    fn test_create_agency() {
        let store = seeded();
        let engine = engine(&store);

        let agency = engine.create_agency(&new_agency("ABC", "01"), ACTOR).unwrap();
        assert_eq!(agency.status, Status::Active);
        assert_eq!(store.ledger.events_for("agency", "ABC/01").unwrap().len(), 1);

        let err = engine.create_agency(&new_agency("ABC", "01"), ACTOR).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = engine.create_agency(&new_agency("NOPE", "01"), ACTOR).unwrap_err();
        assert_eq!(err, CatalogError::SubtypeNotFound("NOPE".into()));
    }

    #[test]
    fn test_scenario_keep_one_active_agency() {
        let store = seeded();
        let engine = engine(&store);
        engine.create_agency(&new_agency("ABC", "01"), ACTOR).unwrap();
        engine.create_agency(&new_agency("ABC", "02"), ACTOR).unwrap();
        engine.change_agency_status("ABC", "02", "I", ACTOR).unwrap();

        let err = engine.change_agency_status("ABC", "01", "I", ACTOR).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictRule);
        assert!(err.to_string().contains("must keep one active agency"));

        engine.change_agency_status("ABC", "02", "A", ACTOR).unwrap();
        let agency = engine.change_agency_status("ABC", "01", "I", ACTOR).unwrap();
        assert_eq!(agency.status, Status::Inactive);
    }

    #[test]
    fn test_same_state_save_skips_gate() {
        let store = seeded();
        let engine = engine(&store);
        engine.create_agency(&new_agency("ABC", "01"), ACTOR).unwrap();

        let agency = engine.change_agency_status("ABC", "01", "A", "second").unwrap();
        assert_eq!(agency.status, Status::Active);
        assert_eq!(agency.audit.updated_by, "second");
    }

    #[test]
    fn test_agency_not_found() {
        let store = seeded();
        let engine = engine(&store);
        let err = engine.change_agency_status("ABC", "99", "A", ACTOR).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn test_update_and_list_agencies() {
        let store = seeded();
        let engine = engine(&store);
        engine.create_agency(&new_agency("ABC", "01"), ACTOR).unwrap();
        engine.create_agency(&new_agency("ABC", "02"), ACTOR).unwrap();

        let agency = engine.update_agency("ABC", "02", Some(" North "), ACTOR).unwrap();
        assert_eq!(agency.name.as_deref(), Some("North"));
        assert_eq!(engine.get_agency("ABC", "02").unwrap().name.as_deref(), Some("North"));

        let listed = engine.list_agencies("ABC", None, Page::default()).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(engine.list_agencies("NOPE", None, Page::default()).is_err());
    }
}
