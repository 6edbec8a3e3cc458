use chrono::{DateTime, Utc};
use quarry_common::{Error, Result};
use rusqlite::{Connection, params};

use crate::unit::MigrationUnit;

/// Outcome of one apply attempt, as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Applied,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerStatus::Applied => "applied",
            LedgerStatus::Failed => "failed",
        }
    }
}

/// One row of the append-only migration ledger.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub unit_id: String,
    pub author: String,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    pub order_applied: i64,
    pub checksum: String,
    pub status: LedgerStatus,
}

/// Persistent record of which migration units have been applied, in what
/// order, with what content checksum. Rows are inserted and never updated;
/// a partial unique index keeps at most one `applied` row per unit while
/// still allowing failed attempts to remain for diagnosis.
pub struct Ledger;

impl Ledger {
    pub fn ensure_table(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_ledger (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                unit_id       TEXT NOT NULL,
                author        TEXT NOT NULL,
                description   TEXT NOT NULL,
                applied_at    TEXT NOT NULL DEFAULT (datetime('now')),
                order_applied INTEGER NOT NULL,
                checksum      TEXT NOT NULL,
                status        TEXT NOT NULL CHECK(status IN ('applied', 'failed'))
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_schema_ledger_applied
                ON schema_ledger(unit_id) WHERE status = 'applied';",
        )
        .map_err(|e| Error::Database(format!("failed to create schema ledger: {e}")))?;
        Ok(())
    }

    /// The authoritative `applied` entry for a unit, if any. Failed attempts
    /// do not count as applied.
    pub fn applied_entry(conn: &Connection, unit_id: &str) -> Result<Option<LedgerEntry>> {
        let mut stmt = conn
            .prepare(
                "SELECT unit_id, author, description, applied_at, order_applied, checksum, status
                 FROM schema_ledger
                 WHERE unit_id = ?1 AND status = 'applied'",
            )
            .map_err(|e| Error::Database(format!("failed to prepare ledger query: {e}")))?;

        let entry = stmt.query_row(params![unit_id], row_to_entry).ok();
        Ok(entry)
    }

    /// All ledger rows in apply order, failed attempts included.
    pub fn entries(conn: &Connection) -> Result<Vec<LedgerEntry>> {
        let mut stmt = conn
            .prepare(
                "SELECT unit_id, author, description, applied_at, order_applied, checksum, status
                 FROM schema_ledger
                 ORDER BY order_applied ASC, id ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare ledger query: {e}")))?;

        let rows = stmt
            .query_map([], row_to_entry)
            .map_err(|e| Error::Database(format!("failed to query ledger: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries
                .push(row.map_err(|e| Error::Database(format!("failed to read ledger row: {e}")))?);
        }
        Ok(entries)
    }

    /// Append a row for a unit. For `Applied` this must run on the same
    /// connection, inside the transaction that executed the unit's
    /// operations, so the schema change and its ledger entry commit together.
    pub fn record(
        conn: &Connection,
        unit: &MigrationUnit,
        checksum: &str,
        status: LedgerStatus,
    ) -> Result<i64> {
        let order = Self::next_order(conn)?;
        conn.execute(
            "INSERT INTO schema_ledger (unit_id, author, description, order_applied, checksum, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                unit.id,
                unit.author,
                unit.description,
                order,
                checksum,
                status.as_str()
            ],
        )
        .map_err(|e| Error::Database(format!("failed to record ledger entry: {e}")))?;
        Ok(order)
    }

    fn next_order(conn: &Connection) -> Result<i64> {
        let max: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(order_applied), 0) FROM schema_ledger",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to read ledger order: {e}")))?;
        Ok(max + 1)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let status: String = row.get(6)?;
    Ok(LedgerEntry {
        unit_id: row.get(0)?,
        author: row.get(1)?,
        description: row.get(2)?,
        applied_at: parse_datetime(row.get::<_, String>(3)?),
        order_applied: row.get(4)?,
        checksum: row.get(5)?,
        status: if status == "failed" {
            LedgerStatus::Failed
        } else {
            LedgerStatus::Applied
        },
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{ColumnDef, ColumnType, SchemaOp};

    fn unit(id: &str) -> MigrationUnit {
        MigrationUnit::new(
            id,
            "tester",
            "test unit",
            vec![SchemaOp::CreateTable {
                table: format!("t_{}", id.replace('-', "_")),
                columns: vec![ColumnDef::new("id", ColumnType::Integer).primary_key()],
            }],
        )
    }

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        Ledger::ensure_table(&conn).unwrap();
        conn
    }

    #[test]
    fn ensure_table_is_idempotent() {
        let conn = conn();
        Ledger::ensure_table(&conn).unwrap();
        assert!(Ledger::entries(&conn).unwrap().is_empty());
    }

    #[test]
    fn record_assigns_increasing_order() {
        let conn = conn();
        let a = unit("001");
        let b = unit("002");
        assert_eq!(
            Ledger::record(&conn, &a, &a.checksum(), LedgerStatus::Applied).unwrap(),
            1
        );
        assert_eq!(
            Ledger::record(&conn, &b, &b.checksum(), LedgerStatus::Applied).unwrap(),
            2
        );

        let entries = Ledger::entries(&conn).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].unit_id, "001");
        assert_eq!(entries[1].unit_id, "002");
    }

    #[test]
    fn applied_entry_ignores_failed_rows() {
        let conn = conn();
        let u = unit("001");
        Ledger::record(&conn, &u, &u.checksum(), LedgerStatus::Failed).unwrap();
        assert!(Ledger::applied_entry(&conn, "001").unwrap().is_none());

        Ledger::record(&conn, &u, &u.checksum(), LedgerStatus::Applied).unwrap();
        let entry = Ledger::applied_entry(&conn, "001").unwrap().unwrap();
        assert_eq!(entry.status, LedgerStatus::Applied);
        assert_eq!(entry.checksum, u.checksum());
    }

    #[test]
    fn second_applied_row_for_same_unit_is_rejected_by_storage() {
        let conn = conn();
        let u = unit("001");
        Ledger::record(&conn, &u, &u.checksum(), LedgerStatus::Applied).unwrap();
        let err = Ledger::record(&conn, &u, &u.checksum(), LedgerStatus::Applied);
        assert!(err.is_err());
    }
}
