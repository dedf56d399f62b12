use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Known recipient contact from the directory. Immutable reference data;
/// job recipients copy from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientContact {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub email: Option<String>,
}

impl RecipientContact {
    pub fn new(name: impl Into<String>, organization_id: Uuid, email: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            organization_id,
            email,
        }
    }
}
