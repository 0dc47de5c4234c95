//! Persistent credential rows.

use crate::{Database, DbError, OptionalExt};

impl Database {
    pub fn save_credential(&self, key: &str, value: &str) -> Result<(), DbError> {
        let saved_at = chrono::Utc::now().timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO credentials (key, value, saved_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, saved_at = ?3",
                rusqlite::params![key, value, saved_at],
            )?;
            Ok(())
        })
    }

    pub fn get_credential(&self, key: &str) -> Result<Option<String>, DbError> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM credentials WHERE key = ?1", [key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    /// Unix time the credential was last written.
    pub fn credential_saved_at(&self, key: &str) -> Result<Option<i64>, DbError> {
        self.with_conn(|conn| {
            let saved_at = conn
                .query_row("SELECT saved_at FROM credentials WHERE key = ?1", [key], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()?;
            Ok(saved_at)
        })
    }

    pub fn delete_credential(&self, key: &str) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM credentials WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    pub fn delete_all_credentials(&self) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM credentials", [])?;
            Ok(())
        })
    }
}
