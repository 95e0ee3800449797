use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::error::GatewayError;

/// SQLITE_CONSTRAINT_UNIQUE
const SQLITE_CONSTRAINT_UNIQUE: std::ffi::c_int = 2067;

/// Usernames that collide with fixed gateway route prefixes.
pub const RESERVED_USERNAMES: &[&str] = &["x402"];

/// Raw owner → api → endpoint join row, before validation.
///
/// Columns that the schema allows to be empty or NULL stay optional here;
/// [`crate::resolver::EndpointConfig`] is the validated form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRow {
    pub id: i64,
    pub origin_url: Option<String>,
    pub price_micro_stx: i64,
    pub payee_address: Option<String>,
    pub description: Option<String>,
    pub active: bool,
    pub canonical_url: Option<String>,
}

/// One row of the call ledger.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallRecord {
    pub id: i64,
    pub endpoint_id: i64,
    pub caller_wallet: String,
    pub tx_ref: String,
    pub amount_paid: i64,
    pub status_code: Option<i64>,
    pub latency_ms: Option<i64>,
    pub payment_mode: String,
    pub created_at: i64,
}

/// Fields known when a payment is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCallRecord {
    pub endpoint_id: i64,
    pub caller_wallet: String,
    pub tx_ref: String,
    pub amount_paid: i64,
    pub payment_mode: String,
    pub created_at: i64,
}

/// Result of inserting a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with this transaction reference already exists; nothing written.
    Duplicate,
}

/// SQLite database wrapper
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self, GatewayError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, GatewayError> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Internal("database lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), GatewayError> {
        let conn = self.lock()?;

        // WAL is a no-op for :memory: databases
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                wallet_address TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS apis (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE(user_id, slug)
            );

            CREATE TABLE IF NOT EXISTS endpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                api_id INTEGER NOT NULL REFERENCES apis(id),
                path TEXT NOT NULL,
                origin_url TEXT NOT NULL,
                price_micro_stx INTEGER NOT NULL,
                description TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                canonical_url TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(api_id, path)
            );

            CREATE TABLE IF NOT EXISTS api_calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                endpoint_id INTEGER NOT NULL,
                caller_wallet TEXT NOT NULL,
                tx_ref TEXT UNIQUE NOT NULL,
                amount_paid INTEGER NOT NULL,
                status_code INTEGER,
                latency_ms INTEGER,
                payment_mode TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_api_calls_endpoint ON api_calls(endpoint_id);
            "#,
        )?;

        Ok(())
    }

    /// Insert a user. Returns the new row id.
    pub fn create_user(
        &self,
        username: &str,
        wallet_address: Option<&str>,
    ) -> Result<i64, GatewayError> {
        if RESERVED_USERNAMES.contains(&username) {
            return Err(GatewayError::InvalidRequest(format!(
                "username '{username}' is reserved"
            )));
        }
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO users (username, wallet_address, created_at) VALUES (?1, ?2, ?3)",
            params![username, wallet_address, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert an API owned by `user_id`. Returns the new row id.
    pub fn create_api(
        &self,
        user_id: i64,
        slug: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64, GatewayError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            r#"
            INSERT INTO apis (user_id, slug, name, description, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![user_id, slug, name, description, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert an active endpoint under `api_id`. Returns the new row id.
    pub fn create_endpoint(
        &self,
        api_id: i64,
        path: &str,
        origin_url: &str,
        price_micro_stx: i64,
        description: Option<&str>,
    ) -> Result<i64, GatewayError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            r#"
            INSERT INTO endpoints (api_id, path, origin_url, price_micro_stx, description, active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
            "#,
            params![api_id, path, origin_url, price_micro_stx, description, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Toggle an endpoint's `active` flag.
    pub fn set_endpoint_active(&self, endpoint_id: i64, active: bool) -> Result<(), GatewayError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        let rows = conn.execute(
            "UPDATE endpoints SET active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active as i32, now, endpoint_id],
        )?;
        if rows == 0 {
            return Err(GatewayError::NotFound(format!("endpoint #{endpoint_id}")));
        }
        Ok(())
    }

    /// Exact-match lookup of an active endpoint by owner username, API slug and path.
    pub fn find_endpoint(
        &self,
        owner: &str,
        api_slug: &str,
        path: &str,
    ) -> Result<Option<EndpointRow>, GatewayError> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                r#"
                SELECT e.id, e.origin_url, e.price_micro_stx, u.wallet_address,
                       e.description, e.active, e.canonical_url
                FROM endpoints e
                JOIN apis a ON a.id = e.api_id
                JOIN users u ON u.id = a.user_id
                WHERE u.username = ?1 AND a.slug = ?2 AND e.path = ?3 AND e.active = 1
                "#,
                params![owner, api_slug, path],
                |row| {
                    Ok(EndpointRow {
                        id: row.get(0)?,
                        origin_url: row.get(1)?,
                        price_micro_stx: row.get(2)?,
                        payee_address: row.get(3)?,
                        description: row.get(4)?,
                        active: row.get::<_, i32>(5)? == 1,
                        canonical_url: row.get(6)?,
                    })
                },
            )
            .optional()?;

        Ok(row)
    }

    /// Backfill an endpoint's canonical URL. Existing values are never overwritten.
    /// Returns `true` if a row was updated.
    pub fn set_canonical_url(&self, endpoint_id: i64, url: &str) -> Result<bool, GatewayError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE endpoints SET canonical_url = ?1 WHERE id = ?2 AND canonical_url IS NULL",
            params![url, endpoint_id],
        )?;
        Ok(rows > 0)
    }

    /// Insert a ledger row for a confirmed payment.
    /// A second insert for the same `tx_ref` is reported as [`InsertOutcome::Duplicate`].
    pub fn insert_call(&self, record: &NewCallRecord) -> Result<InsertOutcome, GatewayError> {
        let conn = self.lock()?;
        let result = conn.execute(
            r#"
            INSERT INTO api_calls (endpoint_id, caller_wallet, tx_ref, amount_paid, payment_mode, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.endpoint_id,
                record.caller_wallet,
                record.tx_ref,
                record.amount_paid,
                record.payment_mode,
                record.created_at
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(ref err, _))
                if err.extended_code == SQLITE_CONSTRAINT_UNIQUE =>
            {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record the origin outcome on the ledger row keyed by `tx_ref`.
    /// Returns the number of rows touched (0 when the insert never landed).
    pub fn update_call_outcome(
        &self,
        tx_ref: &str,
        status_code: i64,
        latency_ms: i64,
    ) -> Result<usize, GatewayError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE api_calls SET status_code = ?1, latency_ms = ?2 WHERE tx_ref = ?3",
            params![status_code, latency_ms, tx_ref],
        )?;
        Ok(rows)
    }

    /// Fetch a ledger row by transaction reference.
    pub fn get_call(&self, tx_ref: &str) -> Result<Option<CallRecord>, GatewayError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                r#"
                SELECT id, endpoint_id, caller_wallet, tx_ref, amount_paid, status_code,
                       latency_ms, payment_mode, created_at
                FROM api_calls
                WHERE tx_ref = ?1
                "#,
                params![tx_ref],
                map_call_record,
            )
            .optional()?;
        Ok(record)
    }

    /// All ledger rows for one endpoint, oldest first.
    pub fn list_calls(&self, endpoint_id: i64) -> Result<Vec<CallRecord>, GatewayError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, endpoint_id, caller_wallet, tx_ref, amount_paid, status_code,
                   latency_ms, payment_mode, created_at
            FROM api_calls
            WHERE endpoint_id = ?1
            ORDER BY id ASC
            "#,
        )?;
        let records = stmt
            .query_map(params![endpoint_id], map_call_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn map_call_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallRecord> {
    Ok(CallRecord {
        id: row.get(0)?,
        endpoint_id: row.get(1)?,
        caller_wallet: row.get(2)?,
        tx_ref: row.get(3)?,
        amount_paid: row.get(4)?,
        status_code: row.get(5)?,
        latency_ms: row.get(6)?,
        payment_mode: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Database, i64) {
        let db = Database::new(":memory:").unwrap();
        let user = db
            .create_user("alice", Some("ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG"))
            .unwrap();
        let api = db.create_api(user, "weather", "Weather", None).unwrap();
        let endpoint = db
            .create_endpoint(api, "forecast", "https://api.weather.example/v1/forecast", 500_000, None)
            .unwrap();
        (db, endpoint)
    }

    fn new_call(endpoint_id: i64, tx_ref: &str) -> NewCallRecord {
        NewCallRecord {
            endpoint_id,
            caller_wallet: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".to_string(),
            tx_ref: tx_ref.to_string(),
            amount_paid: 500_000,
            payment_mode: "verified".to_string(),
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_find_endpoint_joins_owner_api_path() {
        let (db, endpoint) = seeded();
        let row = db.find_endpoint("alice", "weather", "forecast").unwrap().unwrap();
        assert_eq!(row.id, endpoint);
        assert_eq!(row.price_micro_stx, 500_000);
        assert_eq!(
            row.payee_address.as_deref(),
            Some("ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG")
        );
        assert!(row.canonical_url.is_none());

        assert!(db.find_endpoint("bob", "weather", "forecast").unwrap().is_none());
        assert!(db.find_endpoint("alice", "news", "forecast").unwrap().is_none());
        assert!(db.find_endpoint("alice", "weather", "history").unwrap().is_none());
    }

    #[test]
    fn test_reserved_username_is_refused() {
        let db = Database::new(":memory:").unwrap();
        let err = db.create_user("x402", None).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
        assert!(db.find_endpoint("x402", "weather", "forecast").unwrap().is_none());
        assert!(db.create_user("x402-labs", None).is_ok());
    }

    #[test]
    fn test_inactive_endpoint_is_invisible() {
        let (db, endpoint) = seeded();
        db.set_endpoint_active(endpoint, false).unwrap();
        assert!(db.find_endpoint("alice", "weather", "forecast").unwrap().is_none());
    }

    #[test]
    fn test_canonical_url_is_set_once() {
        let (db, endpoint) = seeded();
        assert!(db.set_canonical_url(endpoint, "https://gw/alice/weather/forecast").unwrap());
        assert!(!db.set_canonical_url(endpoint, "https://other/x").unwrap());
        let row = db.find_endpoint("alice", "weather", "forecast").unwrap().unwrap();
        assert_eq!(
            row.canonical_url.as_deref(),
            Some("https://gw/alice/weather/forecast")
        );
    }

    #[test]
    fn test_duplicate_tx_ref_is_a_noop() {
        let (db, endpoint) = seeded();
        assert_eq!(
            db.insert_call(&new_call(endpoint, "0xabc")).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            db.insert_call(&new_call(endpoint, "0xabc")).unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(db.list_calls(endpoint).unwrap().len(), 1);
    }

    #[test]
    fn test_outcome_update_by_tx_ref() {
        let (db, endpoint) = seeded();
        db.insert_call(&new_call(endpoint, "0xdef")).unwrap();

        let pending = db.get_call("0xdef").unwrap().unwrap();
        assert_eq!(pending.status_code, None);
        assert_eq!(pending.latency_ms, None);

        assert_eq!(db.update_call_outcome("0xdef", 200, 87).unwrap(), 1);
        let done = db.get_call("0xdef").unwrap().unwrap();
        assert_eq!(done.status_code, Some(200));
        assert_eq!(done.latency_ms, Some(87));

        assert_eq!(db.update_call_outcome("0xmissing", 200, 1).unwrap(), 0);
    }
}
