//! Contact Record Types
//!
//! The contact table is the only entity the reconciliation core knows about.
//! Records are never deleted here; the only state change a record can go
//! through is the one-way `primary → secondary` demotion.

use chrono::{DateTime, Utc};

use crate::error::IdentityError;

/// Storage-assigned, monotonically increasing record identifier.
pub type ContactId = i64;

/// Precedence of a contact inside its cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary)
    }

    /// The single legal transition. A secondary can never be promoted back,
    /// and demoting a secondary twice means the caller lost track of the
    /// cluster shape.
    pub fn demote(self) -> Result<Self, IdentityError> {
        match self {
            Self::Primary => Ok(Self::Secondary),
            Self::Secondary => Err(IdentityError::IntegrityFault(
                "attempted to demote a contact that is already secondary".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for LinkPrecedence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LinkPrecedence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            _ => Err(format!("Unknown link precedence: {}", s)),
        }
    }
}

impl TryFrom<String> for LinkPrecedence {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A persisted contact row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Primary this record belongs to; `None` for primaries.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set means excluded: the record is invisible to reconciliation.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ContactRecord {
    pub fn is_primary(&self) -> bool {
        self.link_precedence.is_primary()
    }

    pub fn is_excluded(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// "Oldest wins" ordering key: creation time, ties broken by id.
    pub fn creation_key(&self) -> (DateTime<Utc>, ContactId) {
        (self.created_at, self.id)
    }

    /// True when this record carries exactly the given pair, nulls included.
    pub fn has_pair(&self, email: Option<&str>, phone_number: Option<&str>) -> bool {
        self.email.as_deref() == email && self.phone_number.as_deref() == phone_number
    }
}

/// Normalized input pair handed to the core by the validation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl IdentifyRequest {
    pub fn new(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref().filter(|p| !p.is_empty())
    }

    /// Neither value supplied.
    pub fn is_empty(&self) -> bool {
        self.email().is_none() && self.phone_number().is_none()
    }

    /// Locks covering every supplied identity value.
    pub fn lock_keys(&self) -> Vec<LockKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(email) = self.email() {
            keys.push(LockKey::new(LockKind::Email, email));
        }
        if let Some(phone) = self.phone_number() {
            keys.push(LockKey::new(LockKind::PhoneNumber, phone));
        }
        keys
    }
}

/// Insert payload. Built only through the two constructors so a new row is
/// always either a bare primary or a secondary attached to a primary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    pub fn primary(request: &IdentifyRequest) -> Self {
        Self {
            email: request.email().map(str::to_string),
            phone_number: request.phone_number().map(str::to_string),
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    pub fn secondary(request: &IdentifyRequest, primary_id: ContactId) -> Self {
        Self {
            email: request.email().map(str::to_string),
            phone_number: request.phone_number().map(str::to_string),
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }
}

/// Bulk state transitions applied by `update_many`.
///
/// No free-form field patch: precedence only moves through `Demote`, and
/// `Relink` never touches precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPatch {
    /// primary → secondary, linked to `primary_id`, `updated_at` refreshed
    Demote { primary_id: ContactId },
    /// point an existing secondary at `primary_id`, `updated_at` refreshed
    Relink { primary_id: ContactId },
}

/// One equality / membership condition of a contact filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactPredicate {
    Email(String),
    PhoneNumber(String),
    IdIn(Vec<ContactId>),
    LinkedIdIn(Vec<ContactId>),
}

impl ContactPredicate {
    pub fn matches(&self, record: &ContactRecord) -> bool {
        match self {
            Self::Email(email) => record.email.as_deref() == Some(email.as_str()),
            Self::PhoneNumber(phone) => record.phone_number.as_deref() == Some(phone.as_str()),
            Self::IdIn(ids) => ids.contains(&record.id),
            Self::LinkedIdIn(ids) => record.linked_id.is_some_and(|l| ids.contains(&l)),
        }
    }
}

/// OR of predicates. An empty filter matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilter {
    pub any_of: Vec<ContactPredicate>,
}

impl ContactFilter {
    /// Records sharing the request's email or phone; only supplied sides count.
    pub fn by_identity(request: &IdentifyRequest) -> Self {
        let mut any_of = Vec::with_capacity(2);
        if let Some(email) = request.email() {
            any_of.push(ContactPredicate::Email(email.to_string()));
        }
        if let Some(phone) = request.phone_number() {
            any_of.push(ContactPredicate::PhoneNumber(phone.to_string()));
        }
        Self { any_of }
    }

    pub fn ids(ids: impl IntoIterator<Item = ContactId>) -> Self {
        Self::single(ContactPredicate::IdIn(ids.into_iter().collect()))
    }

    pub fn linked_to(ids: impl IntoIterator<Item = ContactId>) -> Self {
        Self::single(ContactPredicate::LinkedIdIn(ids.into_iter().collect()))
    }

    fn single(predicate: ContactPredicate) -> Self {
        Self {
            any_of: vec![predicate],
        }
    }

    /// True when the filter cannot match any record.
    pub fn is_empty(&self) -> bool {
        self.any_of.iter().all(|p| match p {
            ContactPredicate::IdIn(ids) | ContactPredicate::LinkedIdIn(ids) => ids.is_empty(),
            ContactPredicate::Email(_) | ContactPredicate::PhoneNumber(_) => false,
        })
    }

    pub fn matches(&self, record: &ContactRecord) -> bool {
        self.any_of.iter().any(|p| p.matches(record))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKind {
    Email,
    PhoneNumber,
    /// A cluster, named by one of its primaries' ids
    Cluster,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::PhoneNumber => "phone",
            Self::Cluster => "cluster",
        }
    }
}

/// Lock on one identity value or cluster, held for the rest of the unit of
/// work. Ordered so stores can acquire a set of keys in a single global order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey {
    pub kind: LockKind,
    pub value: String,
}

impl LockKey {
    pub fn new(kind: LockKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn cluster(primary_id: ContactId) -> Self {
        Self::new(LockKind::Cluster, primary_id.to_string())
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.value)
    }
}
