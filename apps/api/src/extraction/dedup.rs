use std::collections::HashSet;

use tracing::debug;

use crate::models::extract::{RoleRequirement, StaffingExtractRecord};

/// Run-wide role registry. The first role seen under a given `required_role`
/// (exact match) wins; later ones are dropped whole.
#[derive(Debug, Default)]
pub struct RoleLedger {
    seen: HashSet<String>,
    roles: Vec<RoleRequirement>,
}

impl RoleLedger {
    /// Admits the roles not yet seen this run and returns them, in order.
    pub fn admit(&mut self, candidates: Vec<RoleRequirement>) -> Vec<RoleRequirement> {
        let mut admitted = Vec::new();
        for role in candidates {
            if self.seen.insert(role.required_role.clone()) {
                admitted.push(role);
            } else {
                debug!("Dropping duplicate role '{}'", role.required_role);
            }
        }
        self.roles.extend(admitted.iter().cloned());
        admitted
    }

    pub fn into_roles(self) -> Vec<RoleRequirement> {
        self.roles
    }
}

/// All distinct roles of one run's records, in record order.
pub fn collapse_roles(records: &[StaffingExtractRecord]) -> Vec<RoleRequirement> {
    let mut ledger = RoleLedger::default();
    for record in records {
        ledger.admit(record.rfp_staffing_requirements.clone());
    }
    ledger.into_roles()
}
