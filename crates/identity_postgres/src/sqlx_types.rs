//! Row types decoded by sqlx and converted into core records.

use chrono::{DateTime, Utc};

use identity_core::{ContactRecord, LinkPrecedence};

/// Column order shared by every contact SELECT and RETURNING clause.
pub const CONTACT_COLUMNS: &str =
    "id, email, phone_number, linked_id, link_precedence, created_at, updated_at, deleted_at";

#[derive(Debug, sqlx::FromRow)]
pub struct PgContactRow {
    pub id: i64,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<i64>,
    pub link_precedence: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<PgContactRow> for ContactRecord {
    type Error = String;

    fn try_from(row: PgContactRow) -> Result<Self, Self::Error> {
        Ok(ContactRecord {
            id: row.id,
            email: row.email,
            phone_number: row.phone_number,
            linked_id: row.linked_id,
            link_precedence: LinkPrecedence::try_from(row.link_precedence)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(precedence: &str) -> PgContactRow {
        let now = Utc::now();
        PgContactRow {
            id: 4,
            email: None,
            phone_number: Some("123456".into()),
            linked_id: Some(1),
            link_precedence: precedence.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn converts_secondary_row() {
        let record = ContactRecord::try_from(row("secondary")).unwrap();
        assert_eq!(record.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(record.linked_id, Some(1));
    }

    #[test]
    fn rejects_unknown_precedence() {
        assert!(ContactRecord::try_from(row("tertiary")).is_err());
    }
}
