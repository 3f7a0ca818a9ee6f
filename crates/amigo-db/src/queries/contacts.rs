//! Contact queries (`contacts`).
//!
//! Contacts are keyed uniquely by verification key; an announce from a
//! known peer refreshes the row in place.

use amigo_types::{Contact, Credential};
use rusqlite::Connection;

use crate::{DbError, Result};

/// Insert or refresh a contact from a credential. Returns the row id.
pub fn upsert(conn: &Connection, credential: &Credential, now_ms: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO contacts
         (verification_key, pseudonym, signature, ecdh_public_key, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(verification_key) DO UPDATE SET
             pseudonym = excluded.pseudonym,
             signature = excluded.signature,
             ecdh_public_key = excluded.ecdh_public_key,
             updated_at = excluded.updated_at",
        rusqlite::params![
            credential.verification_key,
            credential.pseudonym,
            credential.signature,
            credential.ecdh_public_key,
            now_ms,
        ],
    )?;

    let id: i64 = conn.query_row(
        "SELECT id FROM contacts WHERE verification_key = ?1",
        [&credential.verification_key],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get a contact by verification key.
pub fn get_by_key(conn: &Connection, verification_key: &str) -> Result<Contact> {
    conn.query_row(
        "SELECT id, verification_key, pseudonym, signature, ecdh_public_key, created_at, updated_at
         FROM contacts WHERE verification_key = ?1",
        [verification_key],
        row_to_contact,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound("contact".into()),
        other => DbError::Sqlite(other),
    })
}

/// Get a contact by row id.
pub fn get(conn: &Connection, id: i64) -> Result<Contact> {
    conn.query_row(
        "SELECT id, verification_key, pseudonym, signature, ecdh_public_key, created_at, updated_at
         FROM contacts WHERE id = ?1",
        [id],
        row_to_contact,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound("contact".into()),
        other => DbError::Sqlite(other),
    })
}

/// List all contacts sorted by pseudonym.
pub fn list(conn: &Connection) -> Result<Vec<Contact>> {
    let mut stmt = conn.prepare(
        "SELECT id, verification_key, pseudonym, signature, ecdh_public_key, created_at, updated_at
         FROM contacts ORDER BY pseudonym",
    )?;

    let rows = stmt
        .query_map([], row_to_contact)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Remove a contact. Group-membership edges cascade.
pub fn remove(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM contacts WHERE id = ?1", [id])?;
    Ok(())
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        credential: Credential {
            verification_key: row.get(1)?,
            pseudonym: row.get(2)?,
            signature: row.get(3)?,
            ecdh_public_key: row.get(4)?,
        },
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn make_credential(key: &str, pseudonym: &str) -> Credential {
        Credential {
            verification_key: key.to_string(),
            pseudonym: pseudonym.to_string(),
            signature: "sig".to_string(),
            ecdh_public_key: "ecdh".to_string(),
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = test_db();
        let id = upsert(&conn, &make_credential("aa", "Alice"), 1000).expect("upsert");
        let contact = get(&conn, id).expect("get");
        assert_eq!(contact.credential.pseudonym, "Alice");
        assert_eq!(contact.created_at, 1000);
    }

    #[test]
    fn test_upsert_refreshes_in_place() {
        let conn = test_db();
        let id1 = upsert(&conn, &make_credential("aa", "Alice"), 1000).expect("first");
        let id2 = upsert(&conn, &make_credential("aa", "Alicia"), 2000).expect("refresh");
        assert_eq!(id1, id2);

        let contact = get_by_key(&conn, "aa").expect("get");
        assert_eq!(contact.credential.pseudonym, "Alicia");
        assert_eq!(contact.created_at, 1000);
        assert_eq!(contact.updated_at, 2000);
    }

    #[test]
    fn test_list_sorted_by_pseudonym() {
        let conn = test_db();
        upsert(&conn, &make_credential("bb", "Bob"), 1000).expect("upsert");
        upsert(&conn, &make_credential("aa", "Alice"), 1000).expect("upsert");

        let contacts = list(&conn).expect("list");
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].credential.pseudonym, "Alice");
    }

    #[test]
    fn test_missing_contact_not_found() {
        let conn = test_db();
        assert!(matches!(get_by_key(&conn, "zz"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_remove() {
        let conn = test_db();
        let id = upsert(&conn, &make_credential("aa", "Alice"), 1000).expect("upsert");
        remove(&conn, id).expect("remove");
        assert!(matches!(get(&conn, id), Err(DbError::NotFound(_))));
    }
}
