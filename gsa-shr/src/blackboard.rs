//  BLACKBOARD.rs
//
//  Description:
//!   Implements the Blackboard client abstraction: a key/value store
//!   with TTL and LRU eviction, consumed through a
//!   narrow capability (`get`, `put`, `atomic_increment`,
//!   `compare_and_set`, `publish`). Every state mutation in the system
//!   goes through `compare_and_set` so concurrent retries on the same
//!   `job_id` cannot observe a rollback.
//!
//!   Two implementations are provided: `MokaBlackboard`, an in-memory
//!   TTL+LRU cache suitable for a single-process deployment or tests,
//!   and `ScyllaBlackboard`, a durable cluster-backed implementation for
//!   production use.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use moka::sync::Cache;
use scylla::{Session, SessionBuilder};


/***** ERRORS *****/
#[derive(Debug)]
pub enum Error {
    /// Failed to connect to the Blackboard cluster.
    ConnectError { hosts: String, err: String },
    /// Failed to provision the keyspace/tables the Blackboard needs.
    SchemaError { err: String },
    /// A read failed.
    GetError { key: String, err: String },
    /// A write failed.
    PutError { key: String, err: String },
    /// An atomic counter increment failed.
    IncrementError { counter: String, err: String },
    /// A compare-and-set write failed (infrastructure failure, not a CAS mismatch).
    CasError { key: String, err: String },
    /// Publishing to a channel failed (best-effort).
    PublishError { channel: String, err: String },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use Error::*;
        match self {
            ConnectError { hosts, err } => write!(f, "Failed to connect to Blackboard cluster '{hosts}': {err}"),
            SchemaError { err } => write!(f, "Failed to provision Blackboard schema: {err}"),
            GetError { key, err } => write!(f, "Failed to read Blackboard key '{key}': {err}"),
            PutError { key, err } => write!(f, "Failed to write Blackboard key '{key}': {err}"),
            IncrementError { counter, err } => write!(f, "Failed to increment Blackboard counter '{counter}': {err}"),
            CasError { key, err } => write!(f, "Failed compare-and-set on Blackboard key '{key}': {err}"),
            PublishError { channel, err } => write!(f, "Failed to publish to Blackboard channel '{channel}': {err}"),
        }
    }
}

impl std::error::Error for Error {}



/***** LIBRARY *****/
/// Blackboard keys holding the JSON-array job-id indices the stall sweeper
/// scans, since the Blackboard exposes no key-enumeration primitive
/// since the Blackboard only promises point reads/writes. `gsa-api`
/// tracks `analysis`/`dataset` jobs on admission; `gsa-worker` tracks
/// `report` jobs when it enqueues one.
pub const TRACKED_ANALYSIS: &str = "tracked:analysis";
pub const TRACKED_DATASET: &str = "tracked:dataset";
pub const TRACKED_REPORT: &str = "tracked:report";

/// The narrow capability the rest of the system consumes the Blackboard
/// through. Values are opaque bytes; callers serialize their
/// own records (JSON for status/result records, raw bytes for blobs).
#[async_trait]
pub trait Blackboard: Send + Sync {
    /// Reads `key`. Returns `None` if absent or evicted.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Writes `key` to `value`, with an optional TTL after which the entry
    /// may be evicted.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), Error>;

    /// Atomically increments `counter` and returns its new value. Used to
    /// derive globally-unique `job_id`s.
    async fn atomic_increment(&self, counter: &str) -> Result<u64, Error>;

    /// Writes `new` to `key` only if the current value equals `expected`
    /// (`None` meaning "key must be absent"). Returns whether the write
    /// took effect. Every status-record mutation in the system goes
    /// through this to preserve the system's monotonicity invariants.
    async fn compare_and_set(&self, key: &str, expected: Option<&[u8]>, new: Vec<u8>, ttl: Option<Duration>) -> Result<bool, Error>;

    /// Best-effort push notification on `channel`; a failure here never
    /// fails the caller's operation.
    async fn publish(&self, channel: &str, message: &[u8]) -> Result<(), Error>;
}



/// Adds `job_id` to the JSON-array index stored under `index_key`, retrying
/// the read-modify-write on a concurrent CAS loss. The stall sweeper reads
/// these indices (`tracked:analysis`, `tracked:dataset`, `tracked:report`)
/// to find non-terminal jobs despite the Blackboard exposing no key
/// enumeration primitive.
pub async fn track(bb: &dyn Blackboard, index_key: &str, job_id: &str) -> Result<(), Error> {
    loop {
        let current = bb.get(index_key).await?;
        let mut ids: Vec<String> = match &current {
            Some(raw) => serde_json::from_slice(raw).unwrap_or_default(),
            None => Vec::new(),
        };
        if ids.iter().any(|id| id == job_id) {
            return Ok(());
        }
        ids.push(job_id.to_string());
        let encoded = serde_json::to_vec(&ids).expect("Vec<String> is always serializable");
        if bb.compare_and_set(index_key, current.as_deref(), encoded, None).await? {
            return Ok(());
        }
    }
}

/// Removes `job_id` from the JSON-array index stored under `index_key`,
/// retrying on a concurrent CAS loss. A no-op if the id is already absent.
pub async fn untrack(bb: &dyn Blackboard, index_key: &str, job_id: &str) -> Result<(), Error> {
    loop {
        let current = bb.get(index_key).await?;
        let Some(raw) = &current else { return Ok(()) };
        let mut ids: Vec<String> = serde_json::from_slice(raw).unwrap_or_default();
        let before = ids.len();
        ids.retain(|id| id != job_id);
        if ids.len() == before {
            return Ok(());
        }
        let encoded = serde_json::to_vec(&ids).expect("Vec<String> is always serializable");
        if bb.compare_and_set(index_key, current.as_deref(), encoded, None).await? {
            return Ok(());
        }
    }
}

/// Reads the JSON-array index stored under `index_key`, or an empty list if absent.
pub async fn tracked_ids(bb: &dyn Blackboard, index_key: &str) -> Result<Vec<String>, Error> {
    match bb.get(index_key).await? {
        Some(raw) => Ok(serde_json::from_slice(&raw).unwrap_or_default()),
        None => Ok(Vec::new()),
    }
}



/***** MOKA (IN-MEMORY) IMPLEMENTATION *****/
struct Expirable {
    value: Vec<u8>,
    ttl: Option<Duration>,
}

struct TtlExpiry;

impl moka::Expiry<String, Arc<Expirable>> for TtlExpiry {
    fn expire_after_create(&self, _key: &String, value: &Arc<Expirable>, _created_at: std::time::Instant) -> Option<Duration> {
        value.ttl
    }
}

/// In-memory `Blackboard` backed by a `moka` cache with per-entry TTL and
/// size-bounded LRU eviction. Suitable for single-process deployments and
/// for tests; does not survive a process restart.
pub struct MokaBlackboard {
    cache: Cache<String, Arc<Expirable>>,
    counters: Mutex<HashMap<String, u64>>,
    cas_lock: Mutex<()>,
}

impl MokaBlackboard {
    /// Builds a new in-memory Blackboard with the given max entry count (LRU
    /// eviction bound).
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).expire_after(TtlExpiry).build();
        Self { cache, counters: Mutex::new(HashMap::new()), cas_lock: Mutex::new(()) }
    }
}

#[async_trait]
impl Blackboard for MokaBlackboard {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.cache.get(key).map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), Error> {
        self.cache.insert(key.to_string(), Arc::new(Expirable { value, ttl }));
        Ok(())
    }

    async fn atomic_increment(&self, counter: &str) -> Result<u64, Error> {
        let mut counters = self.counters.lock().unwrap_or_else(|poison| poison.into_inner());
        let entry = counters.entry(counter.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn compare_and_set(&self, key: &str, expected: Option<&[u8]>, new: Vec<u8>, ttl: Option<Duration>) -> Result<bool, Error> {
        let _guard = self.cas_lock.lock().unwrap_or_else(|poison| poison.into_inner());
        let current = self.cache.get(key).map(|e| e.value.clone());
        let matches = match (&current, expected) {
            (None, None) => true,
            (Some(cur), Some(exp)) => cur.as_slice() == exp,
            _ => false,
        };
        if matches {
            self.cache.insert(key.to_string(), Arc::new(Expirable { value: new, ttl }));
        }
        Ok(matches)
    }

    async fn publish(&self, channel: &str, _message: &[u8]) -> Result<(), Error> {
        debug!("MokaBlackboard has no subscribers; dropping publish on channel '{channel}'");
        Ok(())
    }
}



/***** SCYLLA (DURABLE) IMPLEMENTATION *****/
/// Durable `Blackboard` backed by a Scylla/Cassandra cluster. Keys and
/// values are stored in a single `kv` table; counters use Scylla's native
/// `counter` column type for atomic, lock-free increments; `compare_and_set`
/// uses a lightweight transaction (`IF`/`IF NOT EXISTS`).
pub struct ScyllaBlackboard {
    session: Session,
    keyspace: String,
}

impl ScyllaBlackboard {
    pub async fn connect(hosts: &[&str], keyspace: impl Into<String>) -> Result<Self, Error> {
        let keyspace = keyspace.into();
        let mut builder = SessionBuilder::new();
        for host in hosts {
            builder = builder.known_node(*host);
        }
        let session = builder.build().await.map_err(|err| Error::ConnectError { hosts: hosts.join(","), err: err.to_string() })?;

        session
            .query(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH REPLICATION = {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
                ),
                &[],
            )
            .await
            .map_err(|err| Error::SchemaError { err: err.to_string() })?;
        session
            .query(format!("CREATE TABLE IF NOT EXISTS {keyspace}.kv (key text PRIMARY KEY, value blob)"), &[])
            .await
            .map_err(|err| Error::SchemaError { err: err.to_string() })?;
        session
            .query(format!("CREATE TABLE IF NOT EXISTS {keyspace}.counters (name text PRIMARY KEY, value counter)"), &[])
            .await
            .map_err(|err| Error::SchemaError { err: err.to_string() })?;

        Ok(Self { session, keyspace })
    }
}

#[async_trait]
impl Blackboard for ScyllaBlackboard {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let query = format!("SELECT value FROM {}.kv WHERE key = ?", self.keyspace);
        let result = self.session.query(query, (key,)).await.map_err(|err| Error::GetError { key: key.to_string(), err: err.to_string() })?;
        let row = result.rows.unwrap_or_default().into_iter().next();
        match row {
            Some(row) => {
                let (value,): (Vec<u8>,) = row.into_typed().map_err(|err| Error::GetError { key: key.to_string(), err: err.to_string() })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), Error> {
        let query = match ttl {
            Some(ttl) => format!("INSERT INTO {}.kv (key, value) VALUES (?, ?) USING TTL {}", self.keyspace, ttl.as_secs()),
            None => format!("INSERT INTO {}.kv (key, value) VALUES (?, ?)", self.keyspace),
        };
        self.session.query(query, (key, value)).await.map_err(|err| Error::PutError { key: key.to_string(), err: err.to_string() })?;
        Ok(())
    }

    async fn atomic_increment(&self, counter: &str) -> Result<u64, Error> {
        let query = format!("UPDATE {}.counters SET value = value + 1 WHERE name = ?", self.keyspace);
        self.session.query(query, (counter,)).await.map_err(|err| Error::IncrementError { counter: counter.to_string(), err: err.to_string() })?;

        let select = format!("SELECT value FROM {}.counters WHERE name = ?", self.keyspace);
        let result =
            self.session.query(select, (counter,)).await.map_err(|err| Error::IncrementError { counter: counter.to_string(), err: err.to_string() })?;
        let row = result.rows.unwrap_or_default().into_iter().next().ok_or_else(|| Error::IncrementError {
            counter: counter.to_string(),
            err: "counter row vanished immediately after increment".to_string(),
        })?;
        let (value,): (i64,) = row.into_typed().map_err(|err| Error::IncrementError { counter: counter.to_string(), err: err.to_string() })?;
        Ok(value as u64)
    }

    async fn compare_and_set(&self, key: &str, expected: Option<&[u8]>, new: Vec<u8>, ttl: Option<Duration>) -> Result<bool, Error> {
        let applied = match expected {
            None => {
                let query = match ttl {
                    Some(ttl) => format!("INSERT INTO {}.kv (key, value) VALUES (?, ?) USING TTL {} IF NOT EXISTS", self.keyspace, ttl.as_secs()),
                    None => format!("INSERT INTO {}.kv (key, value) VALUES (?, ?) IF NOT EXISTS", self.keyspace),
                };
                self.session.query(query, (key, new)).await
            }
            Some(exp) => {
                let query = match ttl {
                    Some(ttl) => format!("UPDATE {}.kv USING TTL {} SET value = ? WHERE key = ? IF value = ?", self.keyspace, ttl.as_secs()),
                    None => format!("UPDATE {}.kv SET value = ? WHERE key = ? IF value = ?", self.keyspace),
                };
                self.session.query(query, (new, key, exp.to_vec())).await
            }
        }
        .map_err(|err| Error::CasError { key: key.to_string(), err: err.to_string() })?;

        let row = applied.rows.unwrap_or_default().into_iter().next();
        let applied = match row {
            Some(row) => row.columns.first().and_then(|c| c.as_ref()).map(|v| matches!(v, scylla::frame::response::result::CqlValue::Boolean(true))).unwrap_or(false),
            None => false,
        };
        Ok(applied)
    }

    async fn publish(&self, channel: &str, _message: &[u8]) -> Result<(), Error> {
        warn!("ScyllaBlackboard has no native pub/sub; dropping publish on channel '{channel}'");
        Ok(())
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn moka_put_get_roundtrip() {
        let bb = MokaBlackboard::new(100);
        bb.put("status:Analysis00000001", b"running".to_vec(), None).await.unwrap();
        assert_eq!(bb.get("status:Analysis00000001").await.unwrap(), Some(b"running".to_vec()));
    }

    #[tokio::test]
    async fn moka_atomic_increment_is_sequential() {
        let bb = MokaBlackboard::new(100);
        assert_eq!(bb.atomic_increment("counter:analysis").await.unwrap(), 1);
        assert_eq!(bb.atomic_increment("counter:analysis").await.unwrap(), 2);
        assert_eq!(bb.atomic_increment("counter:analysis").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn moka_cas_rejects_stale_expected_value() {
        let bb = MokaBlackboard::new(100);
        bb.put("status:Analysis00000001", b"running".to_vec(), None).await.unwrap();
        let applied = bb.compare_and_set("status:Analysis00000001", Some(b"stale"), b"complete".to_vec(), None).await.unwrap();
        assert!(!applied);
        assert_eq!(bb.get("status:Analysis00000001").await.unwrap(), Some(b"running".to_vec()));
    }

    #[tokio::test]
    async fn moka_cas_applies_on_matching_expected_value() {
        let bb = MokaBlackboard::new(100);
        bb.put("status:Analysis00000001", b"running".to_vec(), None).await.unwrap();
        let applied = bb.compare_and_set("status:Analysis00000001", Some(b"running"), b"complete".to_vec(), None).await.unwrap();
        assert!(applied);
        assert_eq!(bb.get("status:Analysis00000001").await.unwrap(), Some(b"complete".to_vec()));
    }

    #[tokio::test]
    async fn moka_cas_on_absent_key_requires_none_expected() {
        let bb = MokaBlackboard::new(100);
        assert!(bb.compare_and_set("counter:fresh", None, b"1".to_vec(), None).await.unwrap());
        assert!(!bb.compare_and_set("counter:fresh-2", Some(b"anything"), b"1".to_vec(), None).await.unwrap());
    }
}
