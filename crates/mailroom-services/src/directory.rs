//! Recipient directory
//!
//! Read-mostly reference data: organizations with their saved addresses and
//! the known contacts that belong to them. Jobs copy from the directory when a
//! recipient is added and never hold a reference back into it.

use mailroom_core::models::{Address, DeliveryType, NewRecipient, Organization, RecipientContact};
use mailroom_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Search hit: a contact with the organization details a caller usually
/// shows next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactMatch {
    pub contact: RecipientContact,
    pub organization_name: String,
    pub default_address: Option<String>,
}

/// Seed file layout accepted by [`RecipientDirectory::from_json`].
#[derive(Debug, Deserialize)]
struct DirectorySeed {
    organizations: Vec<OrganizationSeed>,
}

#[derive(Debug, Deserialize)]
struct OrganizationSeed {
    name: String,
    #[serde(default)]
    addresses: Vec<AddressSeed>,
    #[serde(default)]
    contacts: Vec<ContactSeed>,
}

#[derive(Debug, Deserialize)]
struct AddressSeed {
    label: String,
    full_text: String,
    #[serde(default)]
    is_default: bool,
}

#[derive(Debug, Deserialize)]
struct ContactSeed {
    name: String,
    email: Option<String>,
}

#[derive(Default)]
pub struct RecipientDirectory {
    organizations: RwLock<HashMap<Uuid, Organization>>,
    contacts: RwLock<Vec<RecipientContact>>,
}

impl RecipientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a JSON seed document.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let seed: DirectorySeed = serde_json::from_str(json)?;

        let mut organizations = HashMap::with_capacity(seed.organizations.len());
        let mut contacts = Vec::new();
        for org_seed in seed.organizations {
            let addresses = org_seed
                .addresses
                .into_iter()
                .map(|a| Address::new(a.label, a.full_text, a.is_default))
                .collect();
            let organization = Organization::new(org_seed.name, addresses)?;
            contacts.extend(
                org_seed
                    .contacts
                    .into_iter()
                    .map(|c| RecipientContact::new(c.name, organization.id, c.email)),
            );
            organizations.insert(organization.id, organization);
        }

        tracing::debug!(
            organizations = organizations.len(),
            contacts = contacts.len(),
            "Loaded recipient directory"
        );

        Ok(Self {
            organizations: RwLock::new(organizations),
            contacts: RwLock::new(contacts),
        })
    }

    pub async fn add_organization(&self, organization: Organization) -> AppResult<Uuid> {
        organization.check_single_default()?;
        let id = organization.id;
        self.organizations.write().await.insert(id, organization);
        Ok(id)
    }

    pub async fn add_contact(&self, contact: RecipientContact) -> AppResult<Uuid> {
        if !self
            .organizations
            .read()
            .await
            .contains_key(&contact.organization_id)
        {
            return Err(AppError::not_found("organization", contact.organization_id));
        }
        let id = contact.id;
        self.contacts.write().await.push(contact);
        Ok(id)
    }

    pub async fn organization(&self, organization_id: Uuid) -> AppResult<Organization> {
        self.organizations
            .read()
            .await
            .get(&organization_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("organization", organization_id))
    }

    pub async fn contact(&self, contact_id: Uuid) -> AppResult<RecipientContact> {
        self.contacts
            .read()
            .await
            .iter()
            .find(|c| c.id == contact_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("contact", contact_id))
    }

    /// All organizations, sorted by name.
    pub async fn organizations(&self) -> Vec<Organization> {
        let mut organizations: Vec<_> = self.organizations.read().await.values().cloned().collect();
        organizations.sort_by(|a, b| a.name.cmp(&b.name));
        organizations
    }

    pub async fn contacts(&self) -> Vec<RecipientContact> {
        self.contacts.read().await.clone()
    }

    pub async fn add_address(&self, organization_id: Uuid, address: Address) -> AppResult<Uuid> {
        let mut organizations = self.organizations.write().await;
        let organization = organizations
            .get_mut(&organization_id)
            .ok_or_else(|| AppError::not_found("organization", organization_id))?;
        let id = address.id;
        organization.add_address(address);
        Ok(id)
    }

    pub async fn set_default_address(&self, organization_id: Uuid, address_id: Uuid) -> AppResult<()> {
        let mut organizations = self.organizations.write().await;
        organizations
            .get_mut(&organization_id)
            .ok_or_else(|| AppError::not_found("organization", organization_id))?
            .set_default_address(address_id)
    }

    /// Case-insensitive match on contact name, e-mail or organization name.
    /// An empty query returns every contact.
    pub async fn search(&self, query: &str) -> Vec<ContactMatch> {
        let needle = query.trim().to_lowercase();
        let organizations = self.organizations.read().await;
        let contacts = self.contacts.read().await;

        let mut matches: Vec<ContactMatch> = contacts
            .iter()
            .filter_map(|contact| {
                let organization = organizations.get(&contact.organization_id)?;
                let hit = needle.is_empty()
                    || contact.name.to_lowercase().contains(&needle)
                    || organization.name.to_lowercase().contains(&needle)
                    || contact
                        .email
                        .as_ref()
                        .is_some_and(|e| e.to_lowercase().contains(&needle));
                hit.then(|| ContactMatch {
                    contact: contact.clone(),
                    organization_name: organization.name.clone(),
                    default_address: organization.default_address().map(|a| a.full_text.clone()),
                })
            })
            .collect();
        matches.sort_by(|a, b| a.contact.name.cmp(&b.contact.name));
        matches
    }

    /// Build job-recipient input from a directory contact. Uses `address_id`
    /// when given, otherwise the organization's default address.
    pub async fn new_recipient_for(
        &self,
        contact_id: Uuid,
        address_id: Option<Uuid>,
        document_ids: Vec<Uuid>,
        delivery_type: DeliveryType,
    ) -> AppResult<NewRecipient> {
        let contact = self.contact(contact_id).await?;
        let organization = self.organization(contact.organization_id).await?;

        let address = match address_id {
            Some(id) => organization
                .address(id)
                .ok_or_else(|| AppError::not_found("address", id))?,
            None => organization.default_address().ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Organization '{}' has no default address; choose one explicitly",
                    organization.name
                ))
            })?,
        };

        Ok(NewRecipient {
            name: contact.name,
            organization_id: Some(organization.id),
            email: contact.email,
            address: address.full_text.clone(),
            document_ids,
            delivery_type,
        })
    }
}
