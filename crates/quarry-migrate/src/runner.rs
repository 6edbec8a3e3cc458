use quarry_common::{Error, Result};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::ledger::{Ledger, LedgerStatus};
use crate::unit::MigrationUnit;

/// Apply every not-yet-applied unit in ascending `id` order and return how
/// many were applied in this run.
///
/// Each unit's operations and its ledger entry commit in a single
/// `BEGIN IMMEDIATE` transaction, so a unit is either fully applied and
/// recorded or not applied at all. The immediate transaction also takes
/// SQLite's write lock up front, which serializes concurrent process starts:
/// a second instance blocks until the first finishes, then sees the ledger
/// entry and skips.
///
/// A previously applied unit whose shipped content no longer matches its
/// recorded checksum aborts the whole run; the application must not serve a
/// schema it cannot verify.
pub fn apply(conn: &mut Connection, units: &[MigrationUnit]) -> Result<usize> {
    Ledger::ensure_table(conn)?;

    let mut ordered: Vec<&MigrationUnit> = units.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));
    for pair in ordered.windows(2) {
        if pair[0].id == pair[1].id {
            return Err(Error::MigrationFailed(format!(
                "duplicate migration unit id '{}'",
                pair[0].id
            )));
        }
    }

    let mut applied = 0;
    for unit in ordered {
        let checksum = unit.checksum();

        match Ledger::applied_entry(conn, &unit.id)? {
            Some(entry) if entry.checksum == checksum => {
                debug!("migration {} already applied, skipping", unit.id);
                continue;
            }
            Some(entry) => {
                return Err(Error::ChecksumMismatch {
                    unit_id: unit.id.clone(),
                    expected: entry.checksum,
                    actual: checksum,
                });
            }
            None => {}
        }

        if let Err(failure) = apply_unit(conn, unit, &checksum) {
            // The unit rolled back; keep a failed row for diagnosis before
            // surfacing the fatal error.
            Ledger::record(conn, unit, &checksum, LedgerStatus::Failed)?;
            return Err(failure);
        }

        applied += 1;
        info!("applied migration {}: {}", unit.id, unit.description);
    }

    Ok(applied)
}

fn apply_unit(conn: &mut Connection, unit: &MigrationUnit, checksum: &str) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| Error::Database(format!("failed to begin migration transaction: {e}")))?;

    for sql in unit.render_sql() {
        tx.execute_batch(&sql).map_err(|e| {
            Error::MigrationFailed(format!("unit '{}', statement `{}`: {}", unit.id, sql, e))
        })?;
    }

    Ledger::record(&tx, unit, checksum, LedgerStatus::Applied)?;
    tx.commit()
        .map_err(|e| Error::Database(format!("failed to commit migration '{}': {}", unit.id, e)))
}
