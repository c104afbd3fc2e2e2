//! Operator-facing aggregation and listing over both tables.
//!
//! These run in read transactions and see a consistent snapshot, but may lag
//! writes that commit in the same instant.

use std::cmp::Reverse;

use redb::ReadableTable;

use super::db::{decode, LINKS, SNIPPETS};
use super::model::{LinkRecord, LinkStats, SnippetRecord, SnippetSummary, StoreStats};
use crate::error::BlinkError;

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 100;

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

impl super::db::Store {
    /// Live record counts and the hit total over live links.
    pub fn stats(&self) -> Result<StoreStats, BlinkError> {
        let now = self.now();
        let read_txn = self.db.begin_read()?;
        let mut stats = StoreStats::default();

        let snippets = read_txn.open_table(SNIPPETS)?;
        for item in snippets.iter()? {
            let (_, bytes) = item?;
            let record: SnippetRecord = decode(bytes.value())?;
            if record.is_live(now) {
                stats.snippets += 1;
            }
        }

        let links = read_txn.open_table(LINKS)?;
        for item in links.iter()? {
            let (_, bytes) = item?;
            let record: LinkRecord = decode(bytes.value())?;
            if record.is_expired(now) {
                stats.expired_links += 1;
            } else {
                stats.links += 1;
                stats.total_hits += record.hit_count;
            }
        }

        Ok(stats)
    }

    /// Stored snippets, newest first, including ones that are already dead
    /// but not yet purged.
    pub fn list_snippets(&self, limit: usize) -> Result<Vec<SnippetSummary>, BlinkError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let now = self.now();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SNIPPETS)?;

        let mut rows = Vec::new();
        for item in table.iter()? {
            let (code, bytes) = item?;
            let record: SnippetRecord = decode(bytes.value())?;
            rows.push((code.value().to_owned(), record));
        }
        rows.sort_by_key(|(code, record)| (Reverse(record.created_at), code.clone()));
        rows.truncate(limit);

        rows.into_iter()
            .map(|(code, record)| -> Result<SnippetSummary, BlinkError> {
                Ok(SnippetSummary {
                    content: self.open_content(&record)?,
                    code,
                    is_one_time: record.is_one_time,
                    max_views: record.max_views,
                    view_count: record.view_count,
                    created_at: record.created_at,
                    expires_at: record.expires_at,
                    is_expired: !record.is_live(now),
                })
            })
            .collect()
    }

    /// Stored links, newest first, including expired ones awaiting cleanup.
    pub fn list_links(&self, limit: usize) -> Result<Vec<LinkStats>, BlinkError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let now = self.now();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LINKS)?;

        let mut rows = Vec::new();
        for item in table.iter()? {
            let (slug, bytes) = item?;
            let record: LinkRecord = decode(bytes.value())?;
            rows.push(LinkStats::new(slug.value(), &record, now));
        }
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        rows.truncate(limit);
        Ok(rows)
    }
}
