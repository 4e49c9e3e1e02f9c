//! SQLite storage layer for forecasts, comparisons, and resolver caches.
//!
//! Uses WAL mode for concurrent read performance and prepared statements
//! for insert throughput. Wei quantities and hash lists are stored as text
//! (decimal strings and JSON arrays); floats appear only in Gwei display
//! columns.

use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{
    BlockComparison, BlockPrediction, ContractCacheEntry, ContractKind, PredictionMetadata,
};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Creates or opens a SQLite database with WAL mode enabled.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrations fail.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .wrap_err_with(|| format!("failed to open database at {path}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                block_number INTEGER NOT NULL,
                predicted_transactions TEXT NOT NULL,
                predicted_gas_price REAL NOT NULL,
                transaction_details TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_block
                ON predictions(block_number);

            CREATE TABLE IF NOT EXISTS comparisons (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                block_number INTEGER NOT NULL UNIQUE,
                predicted_transactions TEXT NOT NULL,
                actual_transactions TEXT NOT NULL,
                accuracy REAL NOT NULL,
                miner TEXT NOT NULL,
                builder TEXT,
                builder_name TEXT,
                average_gas_price REAL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS contracts (
                address TEXT PRIMARY KEY,
                contract_name TEXT,
                protocol TEXT,
                kind TEXT,
                abi TEXT,
                verified INTEGER NOT NULL DEFAULT 0,
                fetch_attempted INTEGER NOT NULL DEFAULT 0,
                call_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS signatures (
                selector TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Persists a forecast and returns its row id.
    ///
    /// # Errors
    /// Returns error if serialization or the insert fails.
    pub fn save_prediction(&self, prediction: &BlockPrediction) -> Result<i64> {
        let hashes = serde_json::to_string(&prediction.predicted_transactions)?;
        let details = serde_json::to_string(&prediction.transaction_details)?;
        let metadata = prediction
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO predictions (
                block_number, predicted_transactions, predicted_gas_price,
                transaction_details, metadata, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                prediction.block_number,
                hashes,
                prediction.predicted_gas_price,
                details,
                metadata,
                prediction.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Attaches aggregate metadata to an already-persisted forecast.
    ///
    /// # Errors
    /// Returns error if serialization or the update fails.
    pub fn update_prediction_metadata(&self, id: i64, metadata: &PredictionMetadata) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        self.conn().execute(
            "UPDATE predictions SET metadata = ? WHERE id = ?",
            params![json, id],
        )?;
        Ok(())
    }

    /// Persists a reconciliation record.
    ///
    /// Returns `None` when a comparison for this block number already
    /// exists; the competing write already persisted the record.
    ///
    /// # Errors
    /// Returns error if serialization or the insert fails.
    pub fn save_comparison(&self, comparison: &BlockComparison) -> Result<Option<i64>> {
        let predicted = serde_json::to_string(&comparison.predicted_transactions)?;
        let actual = serde_json::to_string(&comparison.actual_transactions)?;
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO comparisons (
                block_number, predicted_transactions, actual_transactions,
                accuracy, miner, builder, builder_name, average_gas_price, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                comparison.block_number,
                predicted,
                actual,
                comparison.accuracy,
                format!("{:#x}", comparison.miner),
                comparison.builder,
                comparison.builder_name,
                comparison.average_gas_price,
                comparison.timestamp.to_rfc3339(),
            ],
        )?;
        if inserted == 0 {
            tracing::debug!(
                block_number = comparison.block_number,
                "comparison already persisted, skipping"
            );
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    /// Most recent forecasts, newest first.
    ///
    /// # Errors
    /// Returns error if the query or row decoding fails.
    pub fn list_recent_predictions(&self, n: usize) -> Result<Vec<BlockPrediction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, block_number, predicted_transactions, predicted_gas_price,
                    transaction_details, metadata, created_at
             FROM predictions ORDER BY id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![n as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, block_number, hashes, gas_price, details, metadata, created_at) = row?;
            out.push(BlockPrediction {
                id: Some(id),
                block_number,
                predicted_transactions: serde_json::from_str(&hashes)
                    .wrap_err("malformed predicted_transactions column")?,
                predicted_gas_price: gas_price,
                transaction_details: serde_json::from_str(&details)
                    .wrap_err("malformed transaction_details column")?,
                metadata: metadata
                    .map(|m| serde_json::from_str(&m))
                    .transpose()
                    .wrap_err("malformed metadata column")?,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(out)
    }

    /// Total number of persisted forecasts.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn count_predictions(&self) -> Result<u64> {
        let count: u64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Most recent reconciliation records, newest first.
    ///
    /// # Errors
    /// Returns error if the query or row decoding fails.
    pub fn list_recent_comparisons(&self, n: usize) -> Result<Vec<BlockComparison>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, block_number, predicted_transactions, actual_transactions,
                    accuracy, miner, builder, builder_name, average_gas_price, created_at
             FROM comparisons ORDER BY block_number DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![n as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<f64>>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (
                id,
                block_number,
                predicted,
                actual,
                accuracy,
                miner,
                builder,
                builder_name,
                average_gas_price,
                created_at,
            ) = row?;
            out.push(BlockComparison {
                id: Some(id),
                block_number,
                predicted_transactions: serde_json::from_str(&predicted)
                    .wrap_err("malformed predicted_transactions column")?,
                actual_transactions: serde_json::from_str(&actual)
                    .wrap_err("malformed actual_transactions column")?,
                accuracy,
                miner: miner.parse().wrap_err("malformed miner column")?,
                builder,
                builder_name,
                average_gas_price,
                timestamp: parse_timestamp(&created_at)?,
            });
        }
        Ok(out)
    }

    /// Cached resolution outcome for a contract address.
    ///
    /// # Errors
    /// Returns error if the query or row decoding fails.
    pub fn lookup_contract(&self, address: Address) -> Result<Option<ContractCacheEntry>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT contract_name, protocol, kind, abi, verified, fetch_attempted, call_count
                 FROM contracts WHERE address = ?",
                params![format!("{address:#x}")],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, u64>(6)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(contract_name, protocol, kind, abi, verified, fetch_attempted, call_count)| {
                ContractCacheEntry {
                    address,
                    contract_name,
                    protocol,
                    kind: kind.as_deref().and_then(ContractKind::parse),
                    abi,
                    verified,
                    fetch_attempted,
                    call_count,
                }
            },
        ))
    }

    /// Inserts or updates a contract cache entry.
    ///
    /// Concurrent first-fetches for the same address converge: one write
    /// wins on each column and `call_count` is left to
    /// [`Store::increment_contract_call_count`].
    ///
    /// # Errors
    /// Returns error if the upsert fails.
    pub fn upsert_contract(&self, entry: &ContractCacheEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO contracts (
                address, contract_name, protocol, kind, abi,
                verified, fetch_attempted, call_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                contract_name = excluded.contract_name,
                protocol = excluded.protocol,
                kind = excluded.kind,
                abi = excluded.abi,
                verified = excluded.verified,
                fetch_attempted = excluded.fetch_attempted",
            params![
                format!("{:#x}", entry.address),
                entry.contract_name,
                entry.protocol,
                entry.kind.map(|k| k.tag()),
                entry.abi,
                entry.verified,
                entry.fetch_attempted,
                entry.call_count,
            ],
        )?;
        Ok(())
    }

    /// Atomically bumps the consult counter for an address.
    ///
    /// # Errors
    /// Returns error if the update fails.
    pub fn increment_contract_call_count(&self, address: Address) -> Result<()> {
        self.conn().execute(
            "UPDATE contracts SET call_count = call_count + 1 WHERE address = ?",
            params![format!("{address:#x}")],
        )?;
        Ok(())
    }

    /// Number of cached contract entries.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn count_contracts(&self) -> Result<u64> {
        let count: u64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM contracts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Cached method name for a 4-byte selector.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn lookup_signature(&self, selector: [u8; 4]) -> Result<Option<String>> {
        let name = self
            .conn()
            .query_row(
                "SELECT name FROM signatures WHERE selector = ?",
                params![selector_key(selector)],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Caches a resolved method name for a selector.
    ///
    /// # Errors
    /// Returns error if the insert fails.
    pub fn save_signature(&self, selector: [u8; 4], name: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO signatures (selector, name) VALUES (?, ?)",
            params![selector_key(selector), name],
        )?;
        Ok(())
    }
}

fn selector_key(selector: [u8; 4]) -> String {
    format!("0x{}", alloy::primitives::hex::encode(selector))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .wrap_err("malformed created_at column")?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TxAnnotation, TxKind};
    use alloy::primitives::B256;
    use std::collections::BTreeMap;

    fn test_store() -> Store {
        Store::new(":memory:").expect("in-memory store should always open")
    }

    fn sample_prediction(block_number: u64) -> BlockPrediction {
        let hash = B256::repeat_byte(0xab);
        let mut details = BTreeMap::new();
        let mut ann = TxAnnotation::unknown();
        ann.kind = TxKind::Swap;
        details.insert(hash, ann);
        BlockPrediction {
            id: None,
            block_number,
            predicted_transactions: vec![hash],
            predicted_gas_price: 3.0,
            transaction_details: details,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    fn sample_comparison(block_number: u64) -> BlockComparison {
        BlockComparison {
            id: None,
            block_number,
            predicted_transactions: vec![B256::repeat_byte(0x01)],
            actual_transactions: vec![B256::repeat_byte(0x02)],
            accuracy: 50.0,
            miner: Address::repeat_byte(0x11),
            builder: None,
            builder_name: Some("unknown".to_string()),
            average_gas_price: Some(3.0),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn prediction_roundtrip() {
        let store = test_store();
        let id = store.save_prediction(&sample_prediction(100)).unwrap();
        assert!(id > 0);

        let metadata = PredictionMetadata {
            total_value_wei: "1000".to_string(),
            ..Default::default()
        };
        store.update_prediction_metadata(id, &metadata).unwrap();

        let listed = store.list_recent_predictions(10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].block_number, 100);
        assert_eq!(listed[0].metadata.as_ref().unwrap().total_value_wei, "1000");
        assert_eq!(store.count_predictions().unwrap(), 1);
    }

    #[test]
    fn comparison_unique_per_block_number() {
        let store = test_store();
        let first = store.save_comparison(&sample_comparison(200)).unwrap();
        assert!(first.is_some());

        // Competing write for the same block number is swallowed.
        let second = store.save_comparison(&sample_comparison(200)).unwrap();
        assert!(second.is_none());

        let listed = store.list_recent_comparisons(10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].accuracy, 50.0);
    }

    #[test]
    fn contract_upsert_preserves_call_count() {
        let store = test_store();
        let addr = Address::repeat_byte(0x22);

        let mut entry = ContractCacheEntry::empty(addr);
        entry.contract_name = Some("Router".to_string());
        store.upsert_contract(&entry).unwrap();
        store.increment_contract_call_count(addr).unwrap();
        store.increment_contract_call_count(addr).unwrap();

        // A later upsert must not clobber the counter.
        entry.fetch_attempted = true;
        store.upsert_contract(&entry).unwrap();

        let loaded = store.lookup_contract(addr).unwrap().unwrap();
        assert_eq!(loaded.call_count, 2);
        assert!(loaded.fetch_attempted);
        assert_eq!(loaded.contract_name.as_deref(), Some("Router"));
    }

    #[test]
    fn signature_cache_roundtrip() {
        let store = test_store();
        let selector = [0xa9, 0x05, 0x9c, 0xbb];
        assert!(store.lookup_signature(selector).unwrap().is_none());
        store.save_signature(selector, "transfer(address,uint256)").unwrap();
        assert_eq!(
            store.lookup_signature(selector).unwrap().as_deref(),
            Some("transfer(address,uint256)")
        );
    }
}
