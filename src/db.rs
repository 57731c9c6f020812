//! # Identity Store
//!
//! Durable mapping from IRC nickname to Last.fm username, kept in a single
//! SQLite file. This is the only state lastirc persists.
//!
//! Every operation runs in its own transaction, so a reader never observes a
//! half-written association. Associations are never expired; re-associating a
//! nick simply replaces the old value.

use anyhow::{Context, Result};
use log::{debug, trace};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::fs;
use std::path::Path;

/// Handle to the association table.
pub struct IdentityStore {
    conn: Connection,
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl IdentityStore {
    /// Open (or create) the store at `path`, creating parent directories and
    /// the `association` table when missing.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create store directory at {}. Please check file permissions.",
                    parent.display()
                )
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open identity store at {}", path.display()))?;
        debug!("Opened identity store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Store that lives only as long as the process. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS association (
                nick     TEXT PRIMARY KEY NOT NULL,
                username TEXT NOT NULL
            )",
            [],
        )
        .context("Invalid SQL command when CREATEing association TABLE")?;

        Ok(Self { conn })
    }

    /// Username stored for `nick`, if any.
    pub fn get(&self, nick: &str) -> Result<Option<String>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin read transaction")?;

        let username = tx
            .query_row(
                "SELECT username FROM association WHERE nick = ?1",
                [nick],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("Failed to look up association for '{nick}'"))?;

        tx.commit().context("Commiting read transaction failed")?;
        trace!("Association lookup {nick} -> {username:?}");
        Ok(username)
    }

    /// Associate `nick` with `username`, replacing any previous value.
    pub fn set(&mut self, nick: &str, username: &str) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin write transaction")?;

        tx.execute(
            "INSERT INTO association (nick, username) VALUES (?1, ?2)
             ON CONFLICT(nick) DO UPDATE SET username = excluded.username",
            params![nick, username],
        )
        .with_context(|| format!("Failed to store association {nick} -> {username}"))?;

        tx.commit().context("Commiting SQL transaction failed")?;
        debug!("Associated {nick} with {username}");
        Ok(())
    }

    /// Drop the association for `nick`. Returns whether one existed.
    pub fn remove(&mut self, nick: &str) -> Result<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin write transaction")?;

        let removed = tx
            .execute("DELETE FROM association WHERE nick = ?1", [nick])
            .with_context(|| format!("Failed to remove association for '{nick}'"))?;

        tx.commit().context("Commiting SQL transaction failed")?;
        Ok(removed > 0)
    }

    /// All associations, sorted by nick.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT nick, username FROM association ORDER BY nick")
            .context("Invalid SQL statement when SELECTing associations")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("Cannot query associations.")?;

        let mut associations = Vec::new();
        // Could use collect, but then the error loses its context.
        for row in rows {
            associations.push(row.context("Queried association unwrap failed.")?);
        }

        Ok(associations)
    }

    /// Username to query on behalf of `nick`.
    ///
    /// An explicit username always wins. Otherwise the stored association is
    /// used, and failing that the nick itself is assumed to be a Last.fm name.
    pub fn resolve(&self, nick: &str, explicit: Option<&str>) -> Result<String> {
        if let Some(username) = explicit {
            return Ok(username.to_string());
        }

        Ok(self.get(nick)?.unwrap_or_else(|| nick.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_falls_back_to_nick() -> Result<()> {
        let store = IdentityStore::open_in_memory()?;

        assert_eq!(store.get("alice")?, None);
        assert_eq!(store.resolve("alice", None)?, "alice");
        Ok(())
    }

    #[test]
    fn test_resolve_uses_stored_association() -> Result<()> {
        let mut store = IdentityStore::open_in_memory()?;
        store.set("alice", "alice_fm")?;

        assert_eq!(store.resolve("alice", None)?, "alice_fm");
        Ok(())
    }

    #[test]
    fn test_explicit_username_always_wins() -> Result<()> {
        let mut store = IdentityStore::open_in_memory()?;
        store.set("alice", "alice_fm")?;

        assert_eq!(store.resolve("alice", Some("rj"))?, "rj");
        assert_eq!(store.resolve("nobody", Some("rj"))?, "rj");
        Ok(())
    }

    #[test]
    fn test_reassociation_overwrites() -> Result<()> {
        let mut store = IdentityStore::open_in_memory()?;
        store.set("alice", "first")?;
        store.set("alice", "second")?;

        assert_eq!(store.get("alice")?, Some("second".to_string()));
        assert_eq!(store.list()?, vec![("alice".to_string(), "second".to_string())]);
        Ok(())
    }

    #[test]
    fn test_remove_and_list() -> Result<()> {
        let mut store = IdentityStore::open_in_memory()?;
        store.set("zed", "z")?;
        store.set("amy", "a")?;

        assert_eq!(
            store.list()?,
            vec![
                ("amy".to_string(), "a".to_string()),
                ("zed".to_string(), "z".to_string()),
            ]
        );

        assert!(store.remove("zed")?);
        assert!(!store.remove("zed")?);
        assert_eq!(store.get("zed")?, None);
        Ok(())
    }

    #[test]
    fn test_associations_survive_reopen() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested/associations.db");

        {
            let mut store = IdentityStore::open(&path)?;
            store.set("alice", "alice_fm")?;
        }

        let store = IdentityStore::open(&path)?;
        assert_eq!(store.get("alice")?, Some("alice_fm".to_string()));
        Ok(())
    }
}
