// Entity Models - the catalog hierarchy
//
// BIN → Subtype → Agency, with Commerce Plans and Validations linked to
// subtypes. Each entity file holds the entity plus its in-memory registry.

/// `Stateful` + `Audited` for entities carrying `status` and `audit` fields
macro_rules! stateful_audited {
    ($($entity:ty),+ $(,)?) => {
        $(
            impl $crate::status::Stateful for $entity {
                fn status(&self) -> $crate::status::Status {
                    self.status
                }

                fn set_status(&mut self, status: $crate::status::Status) {
                    self.status = status;
                }
            }

            impl $crate::audit::Audited for $entity {
                fn audit(&self) -> &$crate::audit::Audit {
                    &self.audit
                }

                fn audit_mut(&mut self) -> &mut $crate::audit::Audit {
                    &mut self.audit
                }
            }
        )+
    };
}

pub mod bin;
pub mod subtype;
pub mod agency;
pub mod plan;
pub mod validation;

pub use bin::{Bin, BinRegistry};
pub use subtype::{Subtype, SubtypeRegistry};
pub use agency::{Agency, AgencyRegistry};
pub use plan::{CommercePlan, PlanItem, PlanRegistry, SubtypePlanLink, ValidationMode};
pub use validation::{DataType, RuleValue, Validation, ValidationMap, ValidationRegistry};
