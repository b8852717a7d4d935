use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use vigil_common::types::Rule;

use crate::error::{Result, StorageError};

/// Persisted rule population. The evaluation engine only reads; the API
/// layer writes through the save-time validation path. A deleted rule is
/// simply absent from `list_active` on the next scheduler cycle.
pub struct RuleStore {
    conn: Mutex<Connection>,
}

impl RuleStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS alert_rules (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL,
                title       TEXT NOT NULL,
                enabled     INTEGER NOT NULL DEFAULT 1,
                config_json TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alert_rules_owner
                ON alert_rules(owner_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn upsert(&self, rule: &Rule) -> Result<()> {
        let config_json = serde_json::to_string(rule)?;
        let now = Utc::now().timestamp();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO alert_rules (id, owner_id, title, enabled, config_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 title = excluded.title,
                 enabled = excluded.enabled,
                 config_json = excluded.config_json,
                 updated_at = excluded.updated_at",
            params![
                rule.id,
                rule.owner_id,
                rule.title,
                rule.enabled as i64,
                config_json,
                now
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Rule> {
        let conn = self.lock();
        let config_json: String = conn
            .query_row(
                "SELECT config_json FROM alert_rules WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound {
                    entity: "alert_rule",
                    id: id.to_string(),
                },
                other => StorageError::Sqlite(other),
            })?;
        Ok(serde_json::from_str(&config_json)?)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        let deleted = conn.execute("DELETE FROM alert_rules WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StorageError::NotFound {
                entity: "alert_rule",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Every enabled rule, the scheduler's working set.
    pub fn list_active(&self) -> Result<Vec<Rule>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT config_json FROM alert_rules WHERE enabled = 1 ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(serde_json::from_str(&row?)?);
        }
        Ok(rules)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
