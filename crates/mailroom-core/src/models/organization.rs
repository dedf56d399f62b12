use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// A saved mailing address belonging to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    /// Short label such as "Headquarters" or "Legal Department".
    pub label: String,
    /// Full single-line mailing address.
    pub full_text: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Address {
    pub fn new(label: impl Into<String>, full_text: impl Into<String>, is_default: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            full_text: full_text.into(),
            is_default,
        }
    }
}

/// Organization with an ordered set of saved addresses.
///
/// At most one address is marked default. The address list is private so the
/// invariant can only be changed through [`Organization::set_default_address`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    addresses: Vec<Address>,
}

impl Organization {
    pub fn new(name: impl Into<String>, addresses: Vec<Address>) -> Result<Self, AppError> {
        let org = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            addresses,
        };
        org.check_single_default()?;
        Ok(org)
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn default_address(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.is_default)
    }

    pub fn address(&self, address_id: Uuid) -> Option<&Address> {
        self.addresses.iter().find(|a| a.id == address_id)
    }

    /// Append an address. A new default address replaces the previous default.
    pub fn add_address(&mut self, address: Address) {
        if address.is_default {
            for existing in &mut self.addresses {
                existing.is_default = false;
            }
        }
        self.addresses.push(address);
    }

    /// Move the default flag to `address_id`.
    pub fn set_default_address(&mut self, address_id: Uuid) -> Result<(), AppError> {
        if self.address(address_id).is_none() {
            return Err(AppError::not_found("address", address_id));
        }
        for address in &mut self.addresses {
            address.is_default = address.id == address_id;
        }
        Ok(())
    }

    /// Validates the default-address invariant. Organizations deserialized from
    /// seed files go through this before they reach the directory.
    pub fn check_single_default(&self) -> Result<(), AppError> {
        let defaults = self.addresses.iter().filter(|a| a.is_default).count();
        if defaults > 1 {
            return Err(AppError::InvalidInput(format!(
                "Organization '{}' has {} default addresses; at most one is allowed",
                self.name, defaults
            )));
        }
        Ok(())
    }
}
