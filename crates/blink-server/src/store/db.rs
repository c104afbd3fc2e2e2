use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::crypto::{self, EncryptionKey};
use super::model::SnippetRecord;
use crate::clock::{Clock, SystemClock};
use crate::error::BlinkError;
use crate::ids::{IdSource, RandomIds};

/// Snippet rows keyed by 4-digit code (`SnippetRecord`, bincode-encoded).
pub(crate) const SNIPPETS: TableDefinition<&str, &[u8]> = TableDefinition::new("snippets");
/// Link rows keyed by slug (`LinkRecord`, bincode-encoded).
pub(crate) const LINKS: TableDefinition<&str, &[u8]> = TableDefinition::new("links");

/// Injected collaborators. Defaults to wall-clock time and thread-RNG draws.
#[derive(Clone)]
pub struct StoreOptions {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdSource>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIds),
        }
    }
}

/// Handle to the redb-backed record store. Cheap to clone.
///
/// redb runs one write transaction at a time, so every operation that checks
/// and then mutates a record (allocation, view counting, hit counting) does
/// both inside a single write transaction and cannot interleave with another.
#[derive(Clone)]
pub struct Store {
    pub(crate) db: Arc<Database>,
    key: Arc<EncryptionKey>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

impl Store {
    pub fn open(path: &Path, key: EncryptionKey) -> Result<Self, BlinkError> {
        Self::open_with(path, key, StoreOptions::default())
    }

    pub fn open_with(
        path: &Path,
        key: EncryptionKey,
        options: StoreOptions,
    ) -> Result<Self, BlinkError> {
        let db = Database::create(path)?;

        // Create both tables up front so read transactions never see them missing.
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(SNIPPETS)?;
            write_txn.open_table(LINKS)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            key: Arc::new(key),
            clock: options.clock,
            ids: options.ids,
        })
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now()
    }

    pub(crate) fn ids(&self) -> &dyn IdSource {
        self.ids.as_ref()
    }

    pub(crate) fn seal_content(&self, content: &str) -> Result<(Vec<u8>, [u8; 12]), BlinkError> {
        Ok(crypto::encrypt(&self.key, content.as_bytes())?)
    }

    pub(crate) fn open_content(&self, record: &SnippetRecord) -> Result<String, BlinkError> {
        let bytes = crypto::decrypt(&self.key, &record.content_encrypted, &record.nonce)?;
        Ok(String::from_utf8(bytes).context("snippet body is not utf-8")?)
    }

    /// Physically remove snippets that are past their TTL or out of views.
    /// Reads already treat them as absent; this only reclaims space.
    pub fn purge_expired_snippets(&self) -> Result<usize, BlinkError> {
        let now = self.now();
        let write_txn = self.db.begin_write()?;
        let purged = {
            let mut table = write_txn.open_table(SNIPPETS)?;
            let mut dead = Vec::new();
            for item in table.iter()? {
                let (code, bytes) = item?;
                let record: SnippetRecord = decode(bytes.value())?;
                if !record.is_live(now) {
                    dead.push(code.value().to_owned());
                }
            }
            for code in &dead {
                table.remove(code.as_str())?;
            }
            dead.len()
        };
        write_txn.commit()?;
        Ok(purged)
    }

    /// Spawn the background task that purges expired snippets every `interval`.
    pub fn spawn_sweep(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let store = self.clone();
                match tokio::task::spawn_blocking(move || store.purge_expired_snippets()).await {
                    Ok(Ok(0)) => debug!("sweep: nothing to purge"),
                    Ok(Ok(n)) => info!(purged = n, "sweep: purged expired snippets"),
                    Ok(Err(e)) => warn!(error = %e, "sweep failed"),
                    Err(e) => warn!(error = %e, "sweep task aborted"),
                }
            }
        })
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).context("bincode encode")
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode")?;
    Ok(value)
}
