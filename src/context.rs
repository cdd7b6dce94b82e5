//! Transcript persistence using SQLite.
//!
//! Records completed exchanges so a chat session can report statistics and
//! keep a log across runs. The generation context window lives in
//! [`crate::history`] and never reads from here.

use rusqlite::{params, Connection, Result};
use std::path::Path;

/// A completed exchange: user utterance plus the generated reply.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub id: i64,
    pub timestamp: String,
    pub user_message: String,
    pub system_reply: String,
    pub token_count: i32,
}

/// SQLite-backed transcript of finished exchanges.
pub struct TranscriptStore {
    conn: Connection,
}

impl TranscriptStore {
    /// Open the transcript, initializing the database if needed.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS exchanges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                user_message TEXT NOT NULL,
                system_reply TEXT NOT NULL,
                token_count INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(Self { conn })
    }

    /// Record one exchange.
    pub fn record(&self, user_message: &str, system_reply: &str, token_count: i32) -> Result<i64> {
        let timestamp = chrono::Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO exchanges (timestamp, user_message, system_reply, token_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![timestamp, user_message, system_reply, token_count],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// The last N exchanges, oldest first.
    pub fn recent(&self, limit: i32) -> Result<Vec<Exchange>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, user_message, system_reply, token_count
             FROM exchanges
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit], |row| {
            Ok(Exchange {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                user_message: row.get(2)?,
                system_reply: row.get(3)?,
                token_count: row.get(4)?,
            })
        })?;

        let mut exchanges = Vec::new();
        for exchange in rows {
            exchanges.push(exchange?);
        }
        exchanges.reverse();

        Ok(exchanges)
    }

    pub fn count(&self) -> Result<i32> {
        self.conn
            .query_row("SELECT COUNT(*) FROM exchanges", [], |row| row.get(0))
    }

    /// Delete the whole transcript.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM exchanges", [])?;
        Ok(())
    }

    /// Totals for the `!stats` command.
    pub fn stats(&self) -> Result<TranscriptStats> {
        let total_exchanges: i32 =
            self.conn
                .query_row("SELECT COUNT(*) FROM exchanges", [], |row| row.get(0))?;

        let total_tokens: i32 = self.conn.query_row(
            "SELECT COALESCE(SUM(token_count), 0) FROM exchanges",
            [],
            |row| row.get(0),
        )?;

        Ok(TranscriptStats {
            total_exchanges,
            total_tokens,
        })
    }
}

/// Statistics about the transcript store.
#[derive(Debug)]
pub struct TranscriptStats {
    pub total_exchanges: i32,
    pub total_tokens: i32,
}
