//! Insertion Policy: does the incoming pair add anything to the cluster?

use std::collections::HashSet;

use crate::types::{ContactRecord, IdentifyRequest};

/// `false` for an exact duplicate pair or when every supplied value is
/// already present somewhere in the cluster; `true` when the request brings
/// an email or phone the cluster has not seen.
pub fn needs_new_record(request: &IdentifyRequest, cluster: &[ContactRecord]) -> bool {
    let email = request.email();
    let phone = request.phone_number();

    if cluster.iter().any(|c| c.has_pair(email, phone)) {
        return false;
    }

    let known_emails: HashSet<&str> = cluster.iter().filter_map(|c| c.email.as_deref()).collect();
    let known_phones: HashSet<&str> = cluster
        .iter()
        .filter_map(|c| c.phone_number.as_deref())
        .collect();

    let new_email = email.is_some_and(|e| !known_emails.contains(e));
    let new_phone = phone.is_some_and(|p| !known_phones.contains(p));

    new_email || new_phone
}
