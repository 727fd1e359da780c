//! Actors and the closed role vocabulary

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Role of an authenticated caller
///
/// Internal staff roles plus the three external actor kinds. Any other
/// value fails to parse.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sales,
    Ops,
    Rmt,
    Admin,
    Founder,
    Subcontractor,
    Epc,
    Nbfc,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Staff roles (sales, ops, rmt, admin, founder)
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Role::Sales | Role::Ops | Role::Rmt | Role::Admin | Role::Founder
        )
    }

    /// Roles allowed to supervise a case (accept bids, restart SLAs)
    pub fn is_supervisor(&self) -> bool {
        matches!(self, Role::Ops | Role::Admin | Role::Founder)
    }
}

/// An already-authenticated caller, passed explicitly into every operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}
