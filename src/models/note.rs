use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use diesel::{Insertable, Queryable};

use crate::errors::ServerError;
use crate::schema::notes;

/// A stored note. `password` holds a PHC-format argon2 hash when the
/// note is protected, never the plaintext.
#[derive(Clone, Debug, Queryable, Insertable)]
#[diesel(table_name = notes)]
pub struct QueryNote {
    pub id: String,
    pub content: String,
    pub password: Option<String>,
}

impl QueryNote {
    pub fn empty(id: String) -> Self {
        QueryNote {
            id,
            content: String::new(),
            password: None,
        }
    }

    pub fn requires_password(&self) -> bool {
        self.password.is_some()
    }

    /// Access rule for content reads and writes: an unprotected note
    /// unlocks for anyone, a protected one only for a matching password.
    pub fn unlock(&self, supplied: Option<&str>) -> Result<&str, ServerError> {
        match &self.password {
            Some(hash) => {
                let supplied = match supplied {
                    Some(p) if !p.is_empty() => p,
                    _ => return Err(ServerError::Unauthorized("Password required")),
                };
                let parsed_hash = PasswordHash::new(hash)?;
                let valid = Argon2::default()
                    .verify_password(supplied.as_bytes(), &parsed_hash)
                    .is_ok();
                if valid {
                    Ok(&self.content)
                } else {
                    Err(ServerError::Unauthorized("Incorrect password"))
                }
            }
            None => Ok(&self.content),
        }
    }

    /// Setting a password is one-time; it cannot be replaced once set.
    pub fn protect(&mut self, passphrase: &str) -> Result<(), ServerError> {
        if self.password.is_some() {
            return Err(ServerError::Conflict("Password already set"));
        }
        self.password = Some(hash_passphrase(passphrase)?);
        Ok(())
    }
}

pub fn hash_passphrase(passphrase: &str) -> Result<String, ServerError> {
    Ok(Argon2::default()
        .hash_password(passphrase.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

/// Note ids are case-insensitive; every lookup and write goes through
/// this normalization first.
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protected_note(passphrase: &str) -> QueryNote {
        let mut note = QueryNote::empty("secret-note".to_string());
        note.content = "hello".to_string();
        note.protect(passphrase).unwrap();
        note
    }

    #[test]
    fn normalize_lowercases_and_trims() {
        assert_eq!(normalize_id("  FooBar "), "foobar");
        assert_eq!(normalize_id("already-lower"), "already-lower");
    }

    #[test]
    fn unprotected_note_unlocks_without_password() {
        let mut note = QueryNote::empty("foo".to_string());
        note.content = "hello".to_string();
        assert_eq!(note.unlock(None).unwrap(), "hello");
        assert_eq!(note.unlock(Some("anything")).unwrap(), "hello");
    }

    #[test]
    fn protected_note_requires_matching_password() {
        let note = protected_note("secret");
        assert_eq!(note.unlock(Some("secret")).unwrap(), "hello");

        match note.unlock(Some("wrong")) {
            Err(ServerError::Unauthorized(msg)) => assert_eq!(msg, "Incorrect password"),
            other => panic!("expected unauthorized, got {:?}", other.map(str::to_string)),
        }
        match note.unlock(None) {
            Err(ServerError::Unauthorized(msg)) => assert_eq!(msg, "Password required"),
            other => panic!("expected unauthorized, got {:?}", other.map(str::to_string)),
        }
        match note.unlock(Some("")) {
            Err(ServerError::Unauthorized(msg)) => assert_eq!(msg, "Password required"),
            other => panic!("expected unauthorized, got {:?}", other.map(str::to_string)),
        }
    }

    #[test]
    fn protect_is_one_time() {
        let mut note = protected_note("secret");
        match note.protect("another") {
            Err(ServerError::Conflict(_)) => {}
            other => panic!("expected conflict, got {:?}", other),
        }
        // the original password still unlocks
        assert_eq!(note.unlock(Some("secret")).unwrap(), "hello");
    }

    #[test]
    fn stored_password_is_a_salted_hash() {
        let note = protected_note("secret");
        let stored = note.password.as_deref().unwrap();
        assert_ne!(stored, "secret");
        assert!(stored.starts_with("$argon2"));

        // same passphrase, fresh salt, different hash
        let other = protected_note("secret");
        assert_ne!(note.password, other.password);
    }
}
