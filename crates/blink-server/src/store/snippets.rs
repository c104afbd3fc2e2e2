use redb::ReadableTable;
use tracing::{debug, info, warn};

use super::db::{decode, encode, SNIPPETS};
use super::model::{CreatedSnippet, SnippetRecord, SnippetView, ViewOutcome, SNIPPET_TTL_SECS};
use crate::error::BlinkError;
use crate::ids::MAX_ALLOCATION_ATTEMPTS;
use crate::validate::{validate_code, validate_content, validate_max_views};

impl super::db::Store {
    /// Store a new snippet under a freshly drawn code.
    ///
    /// Codes held by dead (expired or exhausted) records are reused. Fails
    /// with [`BlinkError::AllocationExhausted`] when every draw hits a live
    /// record.
    pub fn create_snippet(
        &self,
        content: &str,
        is_one_time: bool,
        max_views: Option<u32>,
    ) -> Result<CreatedSnippet, BlinkError> {
        validate_content(content)?;
        validate_max_views(max_views)?;

        let now = self.now();
        let (content_encrypted, nonce) = self.seal_content(content)?;
        let record = SnippetRecord {
            content_encrypted,
            nonce,
            is_one_time,
            max_views,
            view_count: 0,
            created_at: now,
            expires_at: now + SNIPPET_TTL_SECS,
        };
        let bytes = encode(&record)?;

        let write_txn = self.db.begin_write()?;
        let allocated = {
            let mut table = write_txn.open_table(SNIPPETS)?;
            let mut allocated = None;
            for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
                let candidate = self.ids().snippet_code();
                let taken = match table.get(candidate.as_str())? {
                    Some(guard) => decode::<SnippetRecord>(guard.value())?.is_live(now),
                    None => false,
                };
                if taken {
                    debug!(attempt, "snippet code collision");
                    continue;
                }
                table.insert(candidate.as_str(), bytes.as_slice())?;
                allocated = Some(candidate);
                break;
            }
            allocated
        };

        let Some(code) = allocated else {
            warn!(
                attempts = MAX_ALLOCATION_ATTEMPTS,
                "snippet code allocation exhausted"
            );
            return Err(BlinkError::AllocationExhausted);
        };
        write_txn.commit()?;

        info!(
            code = %code,
            is_one_time,
            max_views = ?max_views,
            "audit: snippet.create"
        );
        Ok(CreatedSnippet {
            code,
            expires_at: record.expires_at,
        })
    }

    /// Serve a snippet and apply its read rules in one write transaction:
    /// dead records are evicted and reported as not found, the view counter
    /// is bumped, and the record is removed when this read was the last one
    /// allowed. The reader that reaches the cap still gets the content.
    pub fn read_snippet(&self, code: &str) -> Result<SnippetView, BlinkError> {
        validate_code(code)?;
        let now = self.now();

        // Misses are answered from a read snapshot and never queue for the writer.
        {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SNIPPETS)?;
            let present = table.get(code)?.is_some();
            if !present {
                return Err(BlinkError::NotFound);
            }
        }

        let write_txn = self.db.begin_write()?;
        let served = {
            let mut table = write_txn.open_table(SNIPPETS)?;
            let existing = match table.get(code)? {
                Some(guard) => Some(decode::<SnippetRecord>(guard.value())?),
                None => None,
            };

            match existing {
                None => None,
                Some(record) if !record.is_live(now) => {
                    table.remove(code)?;
                    debug!(code, "evicted dead snippet on read");
                    None
                }
                Some(mut record) => {
                    let content = self.open_content(&record)?;
                    let outcome = record.register_view();
                    match outcome {
                        ViewOutcome::Burn => {
                            table.remove(code)?;
                        }
                        ViewOutcome::Keep => {
                            table.insert(code, encode(&record)?.as_slice())?;
                        }
                    }
                    Some((content, record, outcome))
                }
            }
        };
        write_txn.commit()?;

        let (content, record, outcome) = served.ok_or(BlinkError::NotFound)?;
        if outcome == ViewOutcome::Burn {
            info!(code, view_count = record.view_count, "audit: snippet.burn");
        }

        Ok(SnippetView {
            content,
            view_count: record.view_count,
            is_one_time: record.is_one_time,
            max_views: record.max_views,
            created_at: record.created_at,
        })
    }

    /// Remove a snippet regardless of its state.
    pub fn delete_snippet(&self, code: &str) -> Result<(), BlinkError> {
        validate_code(code)?;
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SNIPPETS)?;
            let existed = table.remove(code)?.is_some();
            existed
        };
        write_txn.commit()?;

        if existed {
            info!(code, "audit: snippet.delete");
            Ok(())
        } else {
            info!(code, "audit: snippet.delete.not_found");
            Err(BlinkError::NotFound)
        }
    }
}
