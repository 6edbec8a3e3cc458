use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use quarry_common::{Error, Result};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog;

const READ_RETRIES: u32 = 3;
const READ_BACKOFF: Duration = Duration::from_millis(50);

/// Persistent storage for user records, backed by the schema the migration
/// runner produced. Opening the store runs all pending migrations; it fails
/// if the schema cannot be brought up to date and verified.
pub struct UserStore {
    conn: Mutex<Connection>,
}

/// A persisted user row. The password is never serialized into API
/// responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the caller when creating a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Partial update. Unique keys (username, email) are immutable after
/// creation and deliberately absent here. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPatch {
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening user store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let applied = quarry_migrate::apply(&mut conn, &catalog::units())?;
        if applied > 0 {
            info!("applied {} pending migration(s)", applied);
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("user store lock poisoned".into()))
    }

    pub fn create(&self, new: &NewUser) -> Result<UserRecord> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO users (username, email, password, first_name, last_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.username,
                new.email,
                new.password,
                new.first_name,
                new.last_name
            ],
        )
        .map_err(|e| map_constraint_error(e, &new.username, &new.email))?;

        let id = conn.last_insert_rowid();
        query_user(&conn, "id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to read created user: {e}")))?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }

    pub fn get(&self, id: i64) -> Result<UserRecord> {
        let conn = self.connection()?;
        retry_read(|| query_user(&conn, "id = ?1", params![id]))
            .map_err(|e| Error::Database(format!("failed to read user: {e}")))?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }

    pub fn get_by_username(&self, username: &str) -> Result<UserRecord> {
        let conn = self.connection()?;
        retry_read(|| query_user(&conn, "username = ?1", params![username]))
            .map_err(|e| Error::Database(format!("failed to read user: {e}")))?
            .ok_or_else(|| Error::NotFound(format!("user with username '{username}'")))
    }

    pub fn get_by_email(&self, email: &str) -> Result<UserRecord> {
        let conn = self.connection()?;
        retry_read(|| query_user(&conn, "email = ?1", params![email]))
            .map_err(|e| Error::Database(format!("failed to read user: {e}")))?
            .ok_or_else(|| Error::NotFound(format!("user with email '{email}'")))
    }

    pub fn list(&self) -> Result<Vec<UserRecord>> {
        let conn = self.connection()?;
        retry_read(|| {
            let mut stmt = conn.prepare(&format!("{SELECT_USERS} ORDER BY id ASC"))?;
            let rows = stmt.query_map([], row_to_user)?;
            rows.collect()
        })
        .map_err(|e| Error::Database(format!("failed to list users: {e}")))
    }

    /// Update the mutable free-form fields. Unique keys cannot change here;
    /// `UserPatch` has no way to express them.
    pub fn update(&self, id: i64, patch: &UserPatch) -> Result<UserRecord> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE users
                 SET password   = COALESCE(?1, password),
                     first_name = COALESCE(?2, first_name),
                     last_name  = COALESCE(?3, last_name),
                     updated_at = datetime('now')
                 WHERE id = ?4",
                params![patch.password, patch.first_name, patch.last_name, id],
            )
            .map_err(|e| Error::Database(format!("failed to update user: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user {id}")));
        }
        query_user(&conn, "id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to re-read user: {e}")))?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }

    /// Mark a user inactive. The row stays retrievable; this is not a
    /// delete.
    pub fn deactivate(&self, id: i64) -> Result<UserRecord> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE users SET is_active = 0, updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .map_err(|e| Error::Database(format!("failed to deactivate user: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user {id}")));
        }
        query_user(&conn, "id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to re-read user: {e}")))?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to delete user: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    pub fn username_exists(&self, username: &str) -> Result<bool> {
        let conn = self.connection()?;
        retry_read(|| {
            conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1",
                params![username],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|n| n > 0)
        .map_err(|e| Error::Database(format!("failed to check username: {e}")))
    }

    pub fn email_exists(&self, email: &str) -> Result<bool> {
        let conn = self.connection()?;
        retry_read(|| {
            conn.query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                params![email],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|n| n > 0)
        .map_err(|e| Error::Database(format!("failed to check email: {e}")))
    }

    pub fn user_count(&self) -> Result<usize> {
        let conn = self.connection()?;
        retry_read(|| {
            conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))
        })
        .map(|n| n as usize)
        .map_err(|e| Error::Database(format!("failed to count users: {e}")))
    }
}

const SELECT_USERS: &str = "SELECT id, username, email, password, first_name, last_name, \
                            is_active, created_at, updated_at FROM users";

fn query_user(
    conn: &Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Option<UserRecord>> {
    conn.query_row(
        &format!("{SELECT_USERS} WHERE {where_clause}"),
        params,
        row_to_user,
    )
    .optional()
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        created_at: parse_datetime(row.get::<_, String>(7)?),
        updated_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

/// Duplicate keys are rejected by the storage layer's unique indexes; the
/// pre-checks in the boundary layer are advisory and this mapping is
/// authoritative.
fn map_constraint_error(e: rusqlite::Error, username: &str, email: &str) -> Error {
    if let rusqlite::Error::SqliteFailure(f, msg) = &e {
        if f.code == ErrorCode::ConstraintViolation {
            let detail = msg.as_deref().unwrap_or("");
            if detail.contains("users.username") {
                return Error::Duplicate(format!("username '{username}' already exists"));
            }
            if detail.contains("users.email") {
                return Error::Duplicate(format!("email '{email}' already exists"));
            }
            return Error::Duplicate(format!(
                "username '{username}' or email '{email}' already exists"
            ));
        }
    }
    Error::Database(format!("failed to create user: {e}"))
}

/// Bounded retry for read operations on a busy database. Mutations are never
/// retried here; re-running an insert or delete is not known to be
/// idempotent.
fn retry_read<T>(mut f: impl FnMut() -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Err(rusqlite::Error::SqliteFailure(e, _))
                if attempt < READ_RETRIES
                    && matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                attempt += 1;
                std::thread::sleep(READ_BACKOFF * attempt);
            }
            other => return other,
        }
    }
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

    fn alice() -> NewUser {
        NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: Some("hunter2hunter2".into()),
            first_name: Some("Alice".into()),
            last_name: None,
        }
    }

    #[test]
    fn create_and_get_round_trip() {
        let store = UserStore::in_memory().unwrap();
        let created = store.create(&alice()).unwrap();

        assert!(created.id >= 1);
        assert!(created.is_active);

        let fetched = store.get(created.id).unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.email, "alice@example.com");
        assert_eq!(fetched.first_name.as_deref(), Some("Alice"));
        assert!(fetched.last_name.is_none());
    }

    #[test]
    fn duplicate_username_is_rejected_by_storage() {
        let store = UserStore::in_memory().unwrap();
        store.create(&alice()).unwrap();

        let mut dup = alice();
        dup.email = "other@example.com".into();
        match store.create(&dup) {
            Err(Error::Duplicate(msg)) => assert!(msg.contains("alice")),
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_email_is_rejected_by_storage() {
        let store = UserStore::in_memory().unwrap();
        store.create(&alice()).unwrap();

        let mut dup = alice();
        dup.username = "alice2".into();
        match store.create(&dup) {
            Err(Error::Duplicate(msg)) => assert!(msg.contains("alice@example.com")),
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn lookups_by_unique_keys() {
        let store = UserStore::in_memory().unwrap();
        let created = store.create(&alice()).unwrap();

        assert_eq!(store.get_by_username("alice").unwrap().id, created.id);
        assert_eq!(
            store.get_by_email("alice@example.com").unwrap().id,
            created.id
        );
        assert!(matches!(
            store.get_by_username("bob"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn exists_checks() {
        let store = UserStore::in_memory().unwrap();
        assert!(!store.username_exists("alice").unwrap());
        store.create(&alice()).unwrap();
        assert!(store.username_exists("alice").unwrap());
        assert!(store.email_exists("alice@example.com").unwrap());
        assert!(!store.email_exists("bob@example.com").unwrap());
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = UserStore::in_memory().unwrap();
        for i in 0..3 {
            store
                .create(&NewUser {
                    username: format!("user{i}"),
                    email: format!("user{i}@example.com"),
                    ..Default::default()
                })
                .unwrap();
        }

        let users = store.list().unwrap();
        assert_eq!(users.len(), 3);
        assert!(users.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn update_touches_only_free_form_fields() {
        let store = UserStore::in_memory().unwrap();
        let created = store.create(&alice()).unwrap();

        let updated = store
            .update(
                created.id,
                &UserPatch {
                    first_name: Some("Alicia".into()),
                    last_name: Some("Smith".into()),
                    password: None,
                },
            )
            .unwrap();

        assert_eq!(updated.first_name.as_deref(), Some("Alicia"));
        assert_eq!(updated.last_name.as_deref(), Some("Smith"));
        // Unique keys unchanged; the patch cannot even name them.
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.email, "alice@example.com");
        // Unset patch fields keep their previous value.
        assert_eq!(updated.password.as_deref(), Some("hunter2hunter2"));
    }

    #[test]
    fn update_missing_user_is_not_found() {
        let store = UserStore::in_memory().unwrap();
        assert!(matches!(
            store.update(42, &UserPatch::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn deactivate_keeps_the_record() {
        let store = UserStore::in_memory().unwrap();
        let created = store.create(&alice()).unwrap();

        let deactivated = store.deactivate(created.id).unwrap();
        assert!(!deactivated.is_active);

        // Still retrievable, unlike delete.
        let fetched = store.get(created.id).unwrap();
        assert!(!fetched.is_active);
    }

    #[test]
    fn delete_removes_the_record() {
        let store = UserStore::in_memory().unwrap();
        let created = store.create(&alice()).unwrap();

        store.delete(created.id).unwrap();
        assert!(matches!(store.get(created.id), Err(Error::NotFound(_))));
        assert!(matches!(store.delete(created.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn user_count_tracks_creates_and_deletes() {
        let store = UserStore::in_memory().unwrap();
        assert_eq!(store.user_count().unwrap(), 0);

        let a = store.create(&alice()).unwrap();
        store
            .create(&NewUser {
                username: "bob".into(),
                email: "bob@example.com".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.user_count().unwrap(), 2);

        store.delete(a.id).unwrap();
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn password_is_not_serialized() {
        let store = UserStore::in_memory().unwrap();
        let created = store.create(&alice()).unwrap();
        let json = serde_json::to_value(&created).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn reopening_a_file_store_reapplies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarry.db");

        {
            let store = UserStore::open(&path).unwrap();
            store.create(&alice()).unwrap();
        }

        // Second open runs the migration runner against an up-to-date
        // schema: zero units applied, data intact.
        let store = UserStore::open(&path).unwrap();
        assert_eq!(store.get_by_username("alice").unwrap().email, "alice@example.com");
    }
}
