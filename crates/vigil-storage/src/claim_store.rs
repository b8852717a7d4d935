use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection};
use vigil_shard::claim::{ClaimStore, ShardClaim};

use crate::error::Result;

/// SQLite-backed shard claim storage.
///
/// Acquisition is a single conditional upsert: the update clause only fires
/// when the existing claim has expired or already belongs to the acquiring
/// worker, which gives the compare-and-swap semantics the shard manager
/// relies on. Timestamps are stored as unix seconds so expiry compares
/// naturally in SQL.
pub struct SqliteClaimStore {
    conn: Mutex<Connection>,
}

impl SqliteClaimStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS shard_claims (
                shard_id   INTEGER PRIMARY KEY,
                owner_id   TEXT NOT NULL,
                claimed_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ClaimStore for SqliteClaimStore {
    fn try_claim(
        &self,
        shard_id: u32,
        owner_id: &str,
        now: DateTime<Utc>,
        period: Duration,
    ) -> anyhow::Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "INSERT INTO shard_claims (shard_id, owner_id, claimed_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(shard_id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 claimed_at = excluded.claimed_at,
                 expires_at = excluded.expires_at
             WHERE shard_claims.expires_at <= excluded.claimed_at
                OR shard_claims.owner_id = excluded.owner_id",
            params![
                shard_id,
                owner_id,
                now.timestamp(),
                (now + period).timestamp()
            ],
        )?;
        Ok(changed == 1)
    }

    fn release(&self, shard_id: u32, owner_id: &str) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM shard_claims WHERE shard_id = ?1 AND owner_id = ?2",
            params![shard_id, owner_id],
        )?;
        Ok(())
    }

    fn live_claims(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<ShardClaim>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT shard_id, owner_id, claimed_at, expires_at
             FROM shard_claims WHERE expires_at > ?1",
        )?;
        let rows = stmt.query_map(params![now.timestamp()], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut claims = Vec::new();
        for row in rows {
            let (shard_id, owner_id, claimed_at, expires_at) = row?;
            claims.push(ShardClaim {
                shard_id,
                owner_id,
                claimed_at: Utc
                    .timestamp_opt(claimed_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                expires_at: Utc
                    .timestamp_opt(expires_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }
        Ok(claims)
    }
}
