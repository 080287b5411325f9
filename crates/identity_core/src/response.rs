//! Response Builder
//!
//! Shapes the final cluster state into the externally visible summary. The
//! primary's own values always lead their lists; the rest follow creation
//! order with duplicates removed.

use serde::{Deserialize, Serialize};

use crate::types::{ContactId, ContactRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyResponse {
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

pub fn build(primary: &ContactRecord, secondaries: &[ContactRecord]) -> IdentifyResponse {
    let mut ordered: Vec<&ContactRecord> = secondaries
        .iter()
        .filter(|s| s.id != primary.id)
        .collect();
    ordered.sort_by_key(|s| s.creation_key());

    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();

    for contact in std::iter::once(primary).chain(ordered.iter().copied()) {
        if let Some(email) = &contact.email {
            push_unique(&mut emails, email);
        }
        if let Some(phone) = &contact.phone_number {
            push_unique(&mut phone_numbers, phone);
        }
    }

    IdentifyResponse {
        primary_contact_id: primary.id,
        emails,
        phone_numbers,
        secondary_contact_ids: ordered.iter().map(|s| s.id).collect(),
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}
