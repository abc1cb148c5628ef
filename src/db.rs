//! SQLite persistence for accounts, connection history and contact edges.
//!
//! Pure storage: no protocol knowledge. The same file is read by external
//! admin tooling, so the schema is part of the public surface.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

use crate::Result;

/// A registered account row.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    pub info: Option<String>,
}

/// A connection-history row, resolved to the account's login.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub login: String,
    pub entry_time: i64,
    pub ip_addr: String,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY,
                login TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                info TEXT
            );

            CREATE TABLE IF NOT EXISTS clients_history (
                id INTEGER PRIMARY KEY,
                client_id INTEGER NOT NULL,
                entry_time INTEGER NOT NULL,
                ip_addr TEXT NOT NULL,
                FOREIGN KEY (client_id) REFERENCES clients(id)
            );

            CREATE TABLE IF NOT EXISTS client_contacts (
                id INTEGER PRIMARY KEY,
                client_id INTEGER NOT NULL,
                interlocutor INTEGER NOT NULL,
                FOREIGN KEY (client_id) REFERENCES clients(id),
                FOREIGN KEY (interlocutor) REFERENCES clients(id)
            );

            CREATE INDEX IF NOT EXISTS idx_history_client ON clients_history(client_id);
            CREATE INDEX IF NOT EXISTS idx_contacts_client ON client_contacts(client_id);
            CREATE INDEX IF NOT EXISTS idx_contacts_interlocutor ON client_contacts(interlocutor);
            ",
        )?;

        Ok(Self { conn })
    }

    pub fn fetch_account(&self, login: &str) -> Result<Option<Account>> {
        let account = self
            .conn
            .query_row(
                "SELECT id, login, password_hash, info FROM clients WHERE login = ?",
                params![login],
                |row| {
                    Ok(Account {
                        id: row.get(0)?,
                        login: row.get(1)?,
                        password_hash: row.get(2)?,
                        info: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    pub fn create_account(
        &self,
        login: &str,
        password_hash: &str,
        info: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO clients (login, password_hash, info) VALUES (?, ?, ?)",
            params![login, password_hash, info],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_info(&self, client_id: i64, info: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE clients SET info = ? WHERE id = ?",
            params![info, client_id],
        )?;
        Ok(())
    }

    /// Append a connection-history row for a confirmed presence.
    pub fn record_connection(&self, client_id: i64, ip_addr: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO clients_history (client_id, entry_time, ip_addr) VALUES (?, ?, ?)",
            params![client_id, unix_now(), ip_addr],
        )?;
        Ok(())
    }

    /// Append a contact edge for a relayed direct message. Duplicates are
    /// allowed; the table is append-only evidence, not a unique set.
    pub fn record_contact(&self, client_id: i64, interlocutor: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO client_contacts (client_id, interlocutor) VALUES (?, ?)",
            params![client_id, interlocutor],
        )?;
        Ok(())
    }

    /// Logins of everyone the account exchanged direct messages with, in
    /// either direction, deduplicated.
    pub fn contacts_of(&self, client_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT c.login FROM clients c
             WHERE c.id IN (
                 SELECT interlocutor FROM client_contacts WHERE client_id = ?1
                 UNION
                 SELECT client_id FROM client_contacts WHERE interlocutor = ?1
             )
             ORDER BY c.login",
        )?;
        let logins = stmt
            .query_map(params![client_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(logins)
    }

    /// All registered logins.
    pub fn logins(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT login FROM clients ORDER BY id")?;
        let logins = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(logins)
    }

    /// Most recent connection-history entries, newest first.
    pub fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.login, h.entry_time, h.ip_addr
             FROM clients_history h
             JOIN clients c ON h.client_id = c.id
             ORDER BY h.entry_time DESC, h.id DESC
             LIMIT ?",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(HistoryEntry {
                    login: row.get(0)?,
                    entry_time: row.get(1)?,
                    ip_addr: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
